pub mod prelude;

pub mod about;
pub mod client_images;
pub mod clients;
pub mod navbar_links;
pub mod portfolio_categories;
pub mod settings;
