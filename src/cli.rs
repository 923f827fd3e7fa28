use std::path::PathBuf;
use std::str::FromStr;

use clap::{Parser, Subcommand};

use crate::manifest::Codec;

#[derive(Parser)]
#[command(name = "qsf")]
#[command(about = "QUIC Stream File container: write and read multiplexed filtered streams")]
#[command(author, version, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write source files into a new container
    Write {
        /// Container path to create
        #[arg(long)]
        out: PathBuf,

        /// Entries as <file>[:token,token,...]
        ///
        /// Tokens: cid, zstr[:deflate|deflate-raw|gzip], encrypt:<keyfile>.
        /// A missing key file is generated and saved.
        #[arg(required = true)]
        entries: Vec<String>,
    },

    /// Read a container back
    Read {
        /// Container path to read
        #[arg(long)]
        src: PathBuf,

        /// Directory decoded streams are extracted into
        #[arg(long)]
        out: Option<PathBuf>,

        /// Dump raw frame records instead of extracting
        #[arg(long)]
        qrec: bool,

        /// Dump manifest records instead of extracting
        #[arg(long)]
        manifest: bool,

        /// Write decoded stream bytes to stdout instead of files
        #[arg(long)]
        stream: bool,

        /// Directory of key files for encrypted streams
        #[arg(long)]
        key_dir: Option<PathBuf>,
    },
}

#[derive(Debug, PartialEq)]
pub enum EncoderToken {
    Cid,
    Zstr(Codec),
    Encrypt(PathBuf),
}

#[derive(Debug, PartialEq)]
pub struct EntrySpec {
    pub path: PathBuf,
    pub tokens: Vec<EncoderToken>,
}

pub fn parse_entry(spec: &str) -> Result<EntrySpec, String> {
    let (path, tokens) = match spec.split_once(':') {
        Some((path, tokens)) => (path, tokens),
        None => (spec, ""),
    };
    if path.is_empty() {
        return Err(format!("entry {:?} has no file path", spec));
    }

    let mut parsed = Vec::new();
    for token in tokens.split(',').filter(|t| !t.is_empty()) {
        parsed.push(parse_token(token)?);
    }

    Ok(EntrySpec {
        path: PathBuf::from(path),
        tokens: parsed,
    })
}

fn parse_token(token: &str) -> Result<EncoderToken, String> {
    if token == "cid" {
        return Ok(EncoderToken::Cid);
    }
    if token == "zstr" {
        return Ok(EncoderToken::Zstr(Codec::Deflate));
    }
    if let Some(codec) = token.strip_prefix("zstr:") {
        return Ok(EncoderToken::Zstr(Codec::from_str(codec)?));
    }
    if let Some(keyfile) = token.strip_prefix("encrypt:") {
        if keyfile.is_empty() {
            return Err("encrypt token needs a key file path".to_string());
        }
        return Ok(EncoderToken::Encrypt(PathBuf::from(keyfile)));
    }
    Err(format!("unknown encoder token {:?}", token))
}
