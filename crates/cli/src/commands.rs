use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// Run the ETL batch: sync every configured table from the source
    /// database into the analytical store.
    Run {
        #[arg(long, help = "Config directory (etl.yaml, tables.yaml, time_offsets.yaml)", default_value = "configs")]
        config_dir: String,

        #[arg(long, help = "Worker-pool width (defaults to the configured value)")]
        workers: Option<usize>,

        #[arg(long, help = "Skip the serving-layer cache invalidation after the batch")]
        no_cache_clear: bool,

        #[arg(long, help = "Override the serving-layer base URL for cache invalidation")]
        api_url: Option<String>,
    },
    /// Create or update the analytical store's derived views.
    Init {
        #[arg(long, help = "Config directory (etl.yaml, tables.yaml, time_offsets.yaml)", default_value = "configs")]
        config_dir: String,
    },
}
