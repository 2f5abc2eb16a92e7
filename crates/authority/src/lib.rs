#![forbid(unsafe_code)]

pub mod http;
pub mod memory;
pub mod remote;

pub use http::{HttpAuthority, HttpAuthorityConfig, HttpConfigError};
pub use memory::InMemoryAuthority;
pub use remote::{AuthorityError, ErrorKind, RemoteAuthority, RpcMethod};
