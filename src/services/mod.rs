// Catalog
pub mod product_images;
pub mod products;

// Customer accounts
pub mod addresses;
