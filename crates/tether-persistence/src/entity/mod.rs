//! SeaORM entities

pub mod connections;

pub mod prelude {
    pub use super::connections::Entity as Connections;
}
