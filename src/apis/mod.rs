pub mod html;
pub mod listing;
pub mod score_table;
