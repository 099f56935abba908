use super::RequestsLoggingLevel;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub requests_logging_level: RequestsLoggingLevel,
    pub port: u16,
    /// Directory served as the web frontend. When unset the root route
    /// answers with a plain status line instead.
    pub frontend_dir_path: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            requests_logging_level: RequestsLoggingLevel::default(),
            port: 3001,
            frontend_dir_path: None,
        }
    }
}
