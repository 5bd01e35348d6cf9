pub mod api_client;
pub mod api_types;
pub mod errors;
pub mod transport;

pub use api_client::ApiClient;
pub use api_types::{ApiPayload, ImageBlob};
pub use errors::{ApiError, ApiResult, BootstrapError, NetworkError};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
