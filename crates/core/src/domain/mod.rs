pub mod product;
pub mod recipient;
pub mod suggestion;
