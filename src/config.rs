use clap::Parser;

#[derive(Parser, Debug)]
pub struct FlatConfig {
    #[arg(long, env = "CONFAB_WORKDIR", default_value = ".confab", help = "Directory holding the WAL database file")]
    workdir: String,

    #[arg(long, env = "CONFAB_LISTEN_ADDR", default_value = "[::]:1698", help = "Socket address the HTTP API binds to")]
    listen_addr: String,
}

#[derive(Debug)]
pub struct Config {
    pub db: DbConfiguration,
    pub http: HttpConfiguration,
}

#[derive(Debug)]
pub struct DbConfiguration {
    pub workdir: String, // CONFAB_WORKDIR
}

#[derive(Debug)]
pub struct HttpConfiguration {
    pub listen_addr: String, // CONFAB_LISTEN_ADDR
}

impl From<FlatConfig> for Config {
    fn from(value: FlatConfig) -> Self {
        Config {
            db: DbConfiguration {
                workdir: value.workdir,
            },
            http: HttpConfiguration {
                listen_addr: value.listen_addr,
            },
        }
    }
}
