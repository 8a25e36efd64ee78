pub mod contact;
pub mod data_client;
pub mod image_converter;
pub mod image_migration;
pub mod image_upload;
pub mod mailer;
pub mod site_service;
pub mod storage;
pub mod table_gateway;
