//! # Gatewayエンドポイント

pub mod files;
pub mod health;
pub mod items;
pub mod validation;

pub use files::{handle_download, handle_upload};
pub use health::{handle_index, handle_live, handle_ready};
pub use items::{
    handle_create_item, handle_delete_item, handle_get_item, handle_list_items,
    handle_update_item,
};
pub use validation::handle_publish_sample;
