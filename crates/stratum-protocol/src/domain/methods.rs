//! Stratum method names used by the client.

/// Version handshake, also used as a liveness check on connect.
pub const SERVER_VERSION: &str = "server.version";
/// Header tip subscription.
pub const HEADERS_SUBSCRIBE: &str = "blockchain.headers.subscribe";
/// Address status subscription.
pub const ADDRESS_SUBSCRIBE: &str = "blockchain.address.subscribe";
/// Single header by height.
pub const GET_HEADER: &str = "blockchain.block.get_header";
/// Retarget-interval chunk of raw headers by index.
pub const GET_CHUNK: &str = "blockchain.block.get_chunk";
/// Confirmed and mempool history of an address.
pub const GET_HISTORY: &str = "blockchain.address.get_history";
/// Raw transaction by id.
pub const TRANSACTION_GET: &str = "blockchain.transaction.get";
/// Broadcast a raw transaction.
pub const TRANSACTION_BROADCAST: &str = "blockchain.transaction.broadcast";
