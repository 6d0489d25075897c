mod catalog;
mod model;

pub use catalog::{normalize_breed_name, strip_parenthetical, BreedCatalog};
pub use model::{Breed, BreedType, PrimaryUse};
