pub mod relay;
pub mod stats;
pub mod transport;

pub use relay::{Envelope, RelayEndpoint, RelayResolver};
pub use stats::{Route, StatsFetcher};
pub use transport::{HttpTransport, JsonTransport, USER_AGENT};
