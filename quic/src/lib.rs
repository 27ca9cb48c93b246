//! QUIC transport: a dual-role endpoint bound over a socket the caller
//! already used for STUN and hole-punching, plus an adapter that exposes
//! one bidirectional stream as a plain byte stream for `russh`'s
//! transport generic.

pub mod endpoint;
pub mod stream;
pub mod tls;

pub use endpoint::QuicEndpoint;
pub use stream::QuicDuplex;
pub use tls::ALPN;
