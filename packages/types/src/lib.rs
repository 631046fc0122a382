pub trait Cacheable: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl dyn Cacheable {
    pub fn downcast_ref<T: Cacheable>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: Cacheable>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }
}

use std::any::Any;

pub use anyhow::{Error, Ok, Result, anyhow, bail};
pub use async_trait::async_trait;
pub use cuid2::create_id;
pub use schemars::JsonSchema;
pub use serde;
pub use serde_json::Value;
pub use tokio_util;

pub mod json {
    pub use serde::{Deserialize, Serialize, de::DeserializeOwned};
    pub use serde_json::{
        Map, Number, from_reader, from_slice, from_str, from_value, json, to_string,
        to_string_pretty, to_value, to_vec, to_vec_pretty,
    };
}

pub use bytes::Bytes;
pub use tokio;

pub mod sync {
    pub use dashmap::DashMap;
    pub use tokio::sync::Mutex;
    pub use tokio::sync::RwLock;
    pub use tokio::sync::broadcast;
    pub use tokio::sync::mpsc;
    pub use tokio_util::sync::CancellationToken;
}

pub use rand;

pub mod error;
pub mod intercom;
pub mod utils;

pub use error::{EngineError, ErrorKind};
