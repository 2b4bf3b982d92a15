use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;

use fsroute::config::{load_config, RoutesConfig};
use fsroute::routing::{map_path, FileCollector, Naming};

#[derive(Parser)]
#[command(name = "fsroute-cli")]
#[command(about = "Inspect fsroute route trees and running servers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum NamingArg {
    Marker,
    MethodFiles,
}

impl From<NamingArg> for Naming {
    fn from(arg: NamingArg) -> Self {
        match arg {
            NamingArg::Marker => Naming::Marker,
            NamingArg::MethodFiles => Naming::MethodFiles,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the route table a routes root would produce
    Routes {
        /// Config file to take route settings from
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Routes root (overrides the config)
        #[arg(short, long)]
        root: Option<String>,

        /// Base route (overrides the config)
        #[arg(short, long)]
        base: Option<String>,

        /// Naming convention (overrides the config)
        #[arg(short, long, value_enum)]
        naming: Option<NamingArg>,
    },
    /// Query a running server's health endpoint
    Health {
        #[arg(short, long, default_value = "http://localhost:3000")]
        url: String,

        #[arg(short, long, default_value = "/health")]
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Routes { config, root, base, naming } => {
            let mut settings = match config {
                Some(path) => load_config(&path)?.routes,
                None => RoutesConfig::default(),
            };
            if let Some(root) = root {
                settings.root = root;
            }
            if let Some(base) = base {
                settings.base_route = base;
            }
            if let Some(naming) = naming {
                settings.naming = naming.into();
            }
            print_routes(&settings)?;
        }
        Commands::Health { url, path } => {
            let res = reqwest::get(format!("{}{}", url.trim_end_matches('/'), path)).await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

fn print_routes(settings: &RoutesConfig) -> Result<(), Box<dyn std::error::Error>> {
    let root = Path::new(&settings.root);
    let collector = FileCollector::new(settings.extensions.clone(), settings.max_depth);
    let files = collector.collect(root)?;

    let mut rows = Vec::new();
    for file in files {
        let Some(template) = map_path(root, &file.path, &settings.base_route, settings.naming, &settings.marker_file)
        else {
            continue;
        };
        let method = match settings.naming {
            Naming::MethodFiles => fsroute::routing::path::file_method(&file.path)
                .map(|m| m.to_string())
                .unwrap_or_else(|| "*".to_string()),
            Naming::Marker => "*".to_string(),
        };
        rows.push((template.as_string(), method, file.relative));
    }

    if rows.is_empty() {
        println!("No route files under {}", root.display());
        return Ok(());
    }

    let width = rows.iter().map(|(t, _, _)| t.len()).max().unwrap_or(0);
    for (template, method, file) in rows {
        println!("{:<7} {:<width$}  {}", method, template, file, width = width);
    }
    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: server returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
