use utoipa::OpenApi;

use crate::routes::{api, chat};

#[derive(OpenApi)]
#[openapi(info(
    title = "gridchat-server",
    description = "Chat proxy for the gridchat data-grid assistant"
))]
pub struct ApiDoc;

pub fn get_docs() -> utoipa::openapi::OpenApi {
    let mut root = ApiDoc::openapi();
    root.merge(api::MiscApi::openapi());
    root.merge(chat::ChatApi::openapi());
    root
}
