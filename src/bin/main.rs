use web_engine::prelude::{log_info, Level};
use web_engine::{Result, Server, ServerConfig};

fn main() -> Result<()> {
    let config = match std::fs::read_to_string("config.yaml") {
        Ok(content) => ServerConfig::from_str(&content)?,
        Err(_) => ServerConfig::default(),
    };

    async_log::init(
        Level::from_u8(config.log_level),
        &config.log_dir,
        ".log",
        if config.log_enabled { config.log_queue_capacity } else { 0 },
    );

    log_info!(
        "starting on port {} with {} worker threads, trig_mode={}",
        config.port,
        config.worker_threads,
        config.trig_mode
    );

    let mut server = Server::new(config)?;
    let result = server.run();
    async_log::shutdown();
    result
}
