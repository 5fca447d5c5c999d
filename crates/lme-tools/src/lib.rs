pub mod adapter;
pub mod adapters;
pub mod args;
pub mod protocol;
mod render;

pub use adapter::{
    build_adapter, AdapterKind, MemoryAdapter, RetrievalSettings, Services, ENV_NOT_SET,
};
pub use protocol::{ParamSpec, ParamType, ToolDescriptor};
