pub mod address;
pub mod product;
pub mod product_image;

pub use address::{Entity as Address, Model as AddressModel};
pub use product::{Entity as Product, Model as ProductModel};
pub use product_image::{Entity as ProductImage, Model as ProductImageModel};
