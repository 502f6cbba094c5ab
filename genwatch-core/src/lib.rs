pub mod api_response;
pub mod generation;
pub mod images;
