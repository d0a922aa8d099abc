pub mod order_extractor;
pub mod order_search;
