//! Shadow for `VkQueryPool`.

use ash::vk;

use crate::objects::handle::{HandleMeta, Nameable};

#[derive(Derivative)]
#[derivative(Debug)]
pub struct QueryPool {
    meta: HandleMeta,
    #[derivative(Debug = "ignore")]
    handle: vk::QueryPool,
    pub query_type: vk::QueryType,
    pub count: u32,
}

impl QueryPool {
    pub fn new(handle: vk::QueryPool, query_type: vk::QueryType, count: u32) -> Self {
        Self {
            meta: HandleMeta::new(),
            handle,
            query_type,
            count,
        }
    }

    pub fn handle(&self) -> vk::QueryPool {
        self.handle
    }
}

impl Nameable for QueryPool {
    fn meta(&self) -> &HandleMeta {
        &self.meta
    }
}
