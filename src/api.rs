use serde::{Deserialize, Serialize};

const DEFAULT_PAGE: u32 = 1;
const DEFAULT_LIMIT: u32 = 50;

#[derive(Debug, Deserialize)]
pub struct QueryParams {
    pub q: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug)]
pub struct HandlerParams {
    pub q: Option<String>,
    pub page: u32,
    pub limit: u32,
    pub offset: u32,
}

impl QueryParams {
    pub fn into_handler_params(self) -> HandlerParams {
        let page = self.page.unwrap_or(DEFAULT_PAGE).max(1);
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, DEFAULT_LIMIT);
        let q = self.q.map(|q| q.trim().to_string()).filter(|q| !q.is_empty());

        HandlerParams {
            q,
            page,
            limit,
            offset: (page - 1) * limit,
        }
    }
}

#[derive(Debug, Serialize, Default)]
pub struct APIResponse<T> {
    pub status: String,
    pub data: T,
}

impl<T: Serialize> APIResponse<T> {
    pub fn new(msg: &str, data: T) -> Self {
        APIResponse {
            status: msg.to_owned(),
            data,
        }
    }
}

impl APIResponse<()> {
    pub fn new_from_msg(msg: &str) -> Self {
        APIResponse {
            status: msg.to_owned(),
            data: (),
        }
    }
}
