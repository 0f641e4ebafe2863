use crate::ObjectId;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum, Debug)]
pub enum ExportFormat {
    Csv,
    Parquet,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(subcommand_precedence_over_arg = true)]
pub struct Args {
    /// One or two `.binpb.zst` record streams
    #[arg(required = true, num_args = 1..=2)]
    pub paths: Vec<String>,

    #[arg(short, long, default_value_t = 10)]
    pub top: usize,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Parser, Debug, Clone, Copy)]
pub struct ObjectArgs {
    /// Object id, decimal or 0x-prefixed hex
    #[arg(value_parser = parse_object_id)]
    pub id: ObjectId,
}

#[derive(Parser, Debug, Clone)]
pub struct ExportArgs {
    #[arg(short, long)]
    pub output: String,
    #[arg(short, long, value_enum, default_value_t = ExportFormat::Csv)]
    pub format: ExportFormat,
}

#[derive(Parser, Debug, Clone)]
pub struct DepthArgs {
    #[arg(short, long)]
    pub output: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Summary,
    Dominator(ObjectArgs),
    Path(ObjectArgs),
    Children(ObjectArgs),
    Retained(ObjectArgs),
    Export(ExportArgs),
    Depth(DepthArgs),
    Compare,
}

pub fn parse_object_id(s: &str) -> Result<ObjectId, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse::<u64>(),
    };
    parsed
        .map(ObjectId)
        .map_err(|e| format!("invalid object id {:?}: {}", s, e))
}
