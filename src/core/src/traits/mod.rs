//! Catalog traits consumed by the authorization engine

pub mod catalog;

pub use catalog::{ApiCatalog, BusinessCatalog, DepartmentCatalog, RoleCatalog, UserCatalog};
