/// Server configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Shared secret the auth proxy attaches to every upgrade request.
    /// When unset, identity parameters are trusted as-is (local dev).
    pub gateway_key: Option<String>,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "4000".to_string())
            .parse()
            .expect("Invalid PORT");

        let gateway_key = std::env::var("GATEWAY_KEY").ok().filter(|k| !k.is_empty());

        Self { port, gateway_key }
    }
}
