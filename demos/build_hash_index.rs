use anyhow::Result;
use cardsight::prelude::{HashEncoder, HashIndexBuilder, HashMethod, HashOptions};
use clap::Parser;
use log::info;
use std::path::PathBuf;

/// Hashes a directory of card images into the four reference tables
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory with the card images (png, jpg, jpeg)
    #[arg(value_name = "DIR")]
    images_dir: PathBuf,

    /// Directory the hash tables are written to
    #[arg(value_name = "DIR")]
    output_dir: PathBuf,

    /// Side of the hashed thumbnail, a power of two
    #[arg(long, default_value = "8", value_name = "SIZE")]
    hash_size: u32,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let encoder = HashEncoder::new(HashOptions::default().hash_size(args.hash_size))?;
    let index = HashIndexBuilder::new(encoder).build_from_dir(&args.images_dir)?;
    index.save_dir(&args.output_dir)?;
    for m in HashMethod::ALL {
        info!("{}: {} codes", m, index.len(m));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::Args;
    use clap::Parser;
    use std::path::PathBuf;

    #[test]
    fn hash_size_defaults_to_eight() {
        let args = Args::try_parse_from(["build_hash_index", "cards", "tables"]).unwrap();
        assert_eq!(args.images_dir, PathBuf::from("cards"));
        assert_eq!(args.output_dir, PathBuf::from("tables"));
        assert_eq!(args.hash_size, 8);

        let args =
            Args::try_parse_from(["build_hash_index", "cards", "tables", "--hash-size", "16"])
                .unwrap();
        assert_eq!(args.hash_size, 16);
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(Args::try_parse_from(["build_hash_index", "cards"]).is_err());
        assert!(
            Args::try_parse_from(["build_hash_index", "cards", "tables", "--hash-size", "x"])
                .is_err()
        );
    }
}
