pub use super::about::Entity as About;
pub use super::client_images::Entity as ClientImages;
pub use super::clients::Entity as Clients;
pub use super::navbar_links::Entity as NavbarLinks;
pub use super::portfolio_categories::Entity as PortfolioCategories;
pub use super::settings::Entity as Settings;
