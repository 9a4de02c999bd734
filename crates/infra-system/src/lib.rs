// syncq Infrastructure - Network Adapters
// Implements: ConnectivityMonitor (TCP probe), OperationHandler ("http")

pub mod connectivity_probe;
pub mod http_handler;

pub use connectivity_probe::TcpConnectivityProbe;
pub use http_handler::{HttpOperationHandler, HttpRequestSpec, HTTP_OPERATION_KIND};
