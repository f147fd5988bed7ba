use anyhow::Result;
use serde::Deserialize;

fn default_http_port() -> u16 {
    3000
}

fn default_pools_file() -> String {
    "pools.json".to_string()
}

#[derive(Deserialize, Debug)]
pub struct Config {
    pub solana_rpc_url: String,
    pub solana_ws_url: String,

    /// Port d'écoute du serveur HTTP.
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// URL publique du service, utilisée par le keep-alive pour se réveiller lui-même.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Fichier JSON où sont persistées les mises à jour de burn par pool.
    #[serde(default = "default_pools_file")]
    pub pools_file: String,

    #[serde(default)]
    pub auto_enable_screener: bool,

    #[serde(default)]
    pub auto_enable_keepalive: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let config = envy::from_env::<Config>()?;
        Ok(config)
    }
}
