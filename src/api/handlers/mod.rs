pub mod admin;
pub mod contact;
pub mod health;
pub mod images;
pub mod site;
