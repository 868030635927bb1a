//! nodevectors CLI - node embeddings from edge lists.
//!
//! # Usage
//!
//! ```bash
//! # Fit GGVec on a CSV edge list, write word2vec-format vectors
//! nodevectors fit edges.csv --method ggvec -o vectors.txt
//!
//! # Node2Vec on a tab-separated file with a header, settings from TOML
//! nodevectors fit edges.tsv --delimiter tab --header --method node2vec \
//!     --config nodevectors.toml -o vectors.txt
//!
//! # Nearest neighbors of a node
//! nodevectors similar vectors.txt alice -k 5
//! ```
//!
//! The TOML file may hold one table per method:
//!
//! ```toml
//! [node2vec]
//! n_components = 64
//! return_weight = 0.5
//!
//! [node2vec.word2vec]
//! window_size = 5
//!
//! [ggvec]
//! order = 2
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use nodevectors::{
    AdjacencyEmbedder, CsrGraph, EdgeListOptions, Embedder, Embeddings, GGVec, GGVecConfig, GloVe,
    GloVeConfig, Node2Vec, Node2VecConfig, ProNE, ProNEConfig, TruncatedSvd,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nodevectors")]
#[command(about = "Fast node embeddings for graphs", long_about = None)]
struct Cli {
    /// More logging (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit an embedder on an edge list and write the vectors
    Fit {
        /// Edge list: `source<delim>target[<delim>weight]` per line
        input: PathBuf,

        /// Embedding method
        #[arg(short, long, default_value = "ggvec")]
        method: Method,

        /// Output vectors file (word2vec text format)
        #[arg(short, long)]
        output: PathBuf,

        /// Also save the fitted model as JSON
        #[arg(long)]
        model: Option<PathBuf>,

        /// Field delimiter: a single character, or `tab`
        #[arg(short, long, default_value = ",")]
        delimiter: String,

        /// First line is a header
        #[arg(long)]
        header: bool,

        /// Treat edges as directed
        #[arg(long)]
        directed: bool,

        /// Embedding dimension (overrides the config file)
        #[arg(long)]
        dim: Option<usize>,

        /// Random seed (overrides the config file)
        #[arg(long)]
        seed: Option<u64>,

        /// TOML file with [node2vec], [ggvec], [prone], [glove] or [svd] tables
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Show the nearest neighbors of a node in a vectors file
    Similar {
        /// Vectors file written by `fit`
        vectors: PathBuf,

        /// Node name
        node: String,

        /// Number of neighbors
        #[arg(short, default_value = "10")]
        k: usize,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Method {
    /// Biased random walks + skip-gram
    Node2vec,
    /// SGD on edge weights
    Ggvec,
    /// Sparse factorization + spectral propagation
    Prone,
    /// Weighted log-count regression
    Glove,
    /// Truncated SVD of the normalized adjacency
    Svd,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct FileConfig {
    node2vec: Node2VecConfig,
    ggvec: GGVecConfig,
    prone: ProNEConfig,
    glove: GloVeConfig,
    svd: SvdConfig,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
struct SvdConfig {
    n_components: usize,
    n_iter: usize,
    normalize_graph: bool,
    seed: u64,
}

impl Default for SvdConfig {
    fn default() -> Self {
        let svd = TruncatedSvd::default();
        Self { n_components: 32, n_iter: svd.n_iter, normalize_graph: true, seed: svd.seed }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Fit { input, method, output, model, delimiter, header, directed, dim, seed, config } => {
            let options = EdgeListOptions { delimiter: parse_delimiter(&delimiter)?, has_header: header, directed };
            let config = load_config(config.as_deref())?;
            cmd_fit(&input, &options, method, config, dim, seed, &output, model.as_deref())
        }
        Commands::Similar { vectors, node, k } => cmd_similar(&vectors, &node, k),
    }
}

fn parse_delimiter(s: &str) -> Result<u8> {
    match s {
        "tab" | "\\t" | "\t" => Ok(b'\t'),
        "space" => Ok(b' '),
        _ if s.len() == 1 => Ok(s.as_bytes()[0]),
        _ => bail!("delimiter must be a single ASCII character or `tab`, got {s:?}"),
    }
}

fn load_config(path: Option<&Path>) -> Result<FileConfig> {
    let Some(path) = path else {
        return Ok(FileConfig::default());
    };
    let text = fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
}

#[allow(clippy::too_many_arguments)]
fn cmd_fit(
    input: &Path,
    options: &EdgeListOptions,
    method: Method,
    mut config: FileConfig,
    dim: Option<usize>,
    seed: Option<u64>,
    output: &Path,
    model_path: Option<&Path>,
) -> Result<()> {
    let start = Instant::now();
    let graph = CsrGraph::read_edgelist(input, options)
        .with_context(|| format!("reading edge list {}", input.display()))?;
    info!(nodes = graph.node_count(), edges = graph.edge_count(), "loaded graph");

    if let Some(d) = dim {
        config.node2vec.n_components = d;
        config.ggvec.n_components = d;
        config.prone.n_components = d;
        config.glove.n_components = d;
        config.svd.n_components = d;
    }
    if let Some(s) = seed {
        config.node2vec.seed = s;
        config.ggvec.seed = s;
        config.prone.seed = s;
        config.glove.seed = s;
        config.svd.seed = s;
    }

    match method {
        Method::Node2vec => fit_and_write(Node2Vec::new(config.node2vec), &graph, output, model_path)?,
        Method::Ggvec => fit_and_write(GGVec::new(config.ggvec), &graph, output, model_path)?,
        Method::Prone => fit_and_write(ProNE::new(config.prone), &graph, output, model_path)?,
        Method::Glove => fit_and_write(GloVe::new(config.glove), &graph, output, model_path)?,
        Method::Svd => {
            let svd = config.svd;
            let reducer = TruncatedSvd { n_iter: svd.n_iter, seed: svd.seed };
            let model = AdjacencyEmbedder::new(reducer, svd.n_components).with_normalize_graph(svd.normalize_graph);
            fit_and_write(model, &graph, output, model_path)?
        }
    }

    println!(
        "Embedded {} nodes with {:?} in {:.2?} -> {}",
        graph.node_count(),
        method,
        start.elapsed(),
        output.display()
    );
    Ok(())
}

fn fit_and_write<E: Embedder + Serialize>(
    mut model: E,
    graph: &CsrGraph,
    output: &Path,
    model_path: Option<&Path>,
) -> Result<()> {
    model.fit(graph).context("fitting embedder")?;
    model
        .save_vectors(output)
        .with_context(|| format!("writing vectors {}", output.display()))?;
    if let Some(path) = model_path {
        nodevectors::save(&model, path).with_context(|| format!("writing model {}", path.display()))?;
    }
    Ok(())
}

fn cmd_similar(vectors: &Path, node: &str, k: usize) -> Result<()> {
    let emb = Embeddings::load_vectors(vectors).with_context(|| format!("reading vectors {}", vectors.display()))?;
    let neighbors = emb.most_similar(node, k)?;

    println!("{:<6} {:<40} {:>10}", "Rank", "Node", "Cosine");
    println!("{}", "-".repeat(58));
    for (rank, (name, score)) in neighbors.iter().enumerate() {
        println!("{:<6} {:<40} {:>10.4}", rank + 1, name, score);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delimiter_names() {
        assert_eq!(parse_delimiter(",").unwrap(), b',');
        assert_eq!(parse_delimiter("tab").unwrap(), b'\t');
        assert_eq!(parse_delimiter(";").unwrap(), b';');
        assert!(parse_delimiter("::").is_err());
    }

    #[test]
    fn config_tables_override_defaults() {
        let cfg: FileConfig = toml::from_str(
            r#"
            [node2vec]
            n_components = 64
            return_weight = 0.5

            [node2vec.word2vec]
            window_size = 3

            [ggvec]
            order = 2
            tol = "auto"

            [svd]
            normalize_graph = false
            "#,
        )
        .unwrap();
        assert_eq!(cfg.node2vec.n_components, 64);
        assert_eq!(cfg.node2vec.return_weight, 0.5);
        assert_eq!(cfg.node2vec.word2vec.window_size, 3);
        assert_eq!(cfg.node2vec.word2vec.negative_samples, 5);
        assert_eq!(cfg.ggvec.order, 2);
        assert_eq!(cfg.prone, ProNEConfig::default());
        assert!(!cfg.svd.normalize_graph);
    }

    #[test]
    fn cli_parses_fit() {
        let cli = Cli::try_parse_from([
            "nodevectors", "fit", "edges.csv", "--method", "prone", "-o", "out.txt", "--dim", "16",
        ])
        .unwrap();
        match cli.command {
            Commands::Fit { method: Method::Prone, dim: Some(16), .. } => {}
            _ => panic!("unexpected parse"),
        }
    }
}
