pub mod client;
pub mod framing;
pub mod protocol;
pub mod server;
pub mod throttle;

pub use client::ServiceClient;
pub use protocol::{AuthRequest, AuthResponse, EnrollRequest, EnrollResponse, Request, Response};
pub use server::{peer_credentials, FaceGateServer, PeerCredentials};
pub use throttle::LoginThrottle;
