use anyhow::Result;
use cardsight::prelude::*;
use cardsight::test_stuff::{paint_card, random_frame, solid_frame};
use clap::Parser;
use log::info;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Identifies the cards of a synthetic frame twice: the second pass is served by the cache.
/// With a hash tables directory and frames every frame is treated as a single card
/// occupying the whole frame and matched against the stored tables.
///
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory with the `image_hashes_*.json` tables
    #[arg(value_name = "DIR", requires = "frames")]
    tables: Option<PathBuf>,

    /// Frame images to identify
    #[arg(value_name = "FRAME")]
    frames: Vec<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    match args.tables {
        Some(tables) => identify_files(&tables, &args.frames),
        None => identify_synthetic(),
    }
}

fn identify_synthetic() -> Result<()> {
    let cards = [
        ("base1-4", [200u8, 40, 90]),
        ("base1-58", [10, 220, 30]),
        ("xy1-1", [30, 60, 240]),
    ];
    let mut reference = cards
        .iter()
        .map(|(id, color)| (id.to_string(), solid_frame(40, 56, *color)))
        .collect::<Vec<_>>();
    reference.push(("noise".to_string(), random_frame(40, 56, 1)));

    let encoder = EmbeddingEncoder::new(
        PreprocessOptions::default().size(32),
        GridPoolExtractor::default(),
    )?;
    let index = EmbeddingIndexBuilder::new(encoder).build_from_images(reference)?;

    let identifier = IdentifierBuilder::without_catalog(2)
        .encoder(EmbeddingEncoder::new(
            PreprocessOptions::default().size(32),
            GridPoolExtractor::default(),
        )?)
        .matcher(EmbeddingMatcher::with_default_top_n(Arc::new(index)))
        .cache_capacity(16)
        .build()?;

    let mut frame = solid_frame(200, 100, [0, 0, 0]);
    let detections = cards
        .iter()
        .enumerate()
        .map(|(i, (_, color))| {
            let bbox = CenterBox::new(30.0 + 70.0 * i as f32, 50.0, 40.0, 56.0);
            paint_card(&mut frame, bbox, *color, i as u64 + 1)
        })
        .collect::<Vec<_>>();

    for pass in 0..2 {
        let res = identifier.identify_frame(&frame, &detections);
        for id in &res.identified {
            info!(
                "Pass {}: track {} is {} (cached: {})",
                pass,
                id.track_id,
                id.catalog_id(),
                id.cached
            );
        }
        if pass == 0 {
            let mut annotated = frame.clone();
            annotate_frame(&mut annotated, &detections, &res);
            let out = env::temp_dir().join("cardsight_annotated.png");
            annotated.save(&out)?;
            info!("Annotated frame is saved to {}", out.display());
        }
    }
    Ok(())
}

fn identify_files(tables: &Path, frames: &[PathBuf]) -> Result<()> {
    let index = HashIndex::load_dir(tables, HashOptions::default().bits())?;
    let identifier = IdentifierBuilder::without_catalog(1)
        .encoder(HashEncoder::default())
        .matcher(HashMatcher::new(Arc::new(index), WeightedFusion::default()))
        .build()?;

    for (i, path) in frames.iter().enumerate() {
        let frame = match load_frame(path) {
            Ok(f) => f,
            Err(e) => {
                log::warn!("{:#}", e);
                continue;
            }
        };
        let (w, h) = frame.dimensions();
        let detection = Detection::new(
            Mask::new(image::GrayImage::from_pixel(w, h, image::Luma([255]))),
            CenterBox::new(w as f32 / 2.0, h as f32 / 2.0, w as f32, h as f32),
            i as u64,
        );
        let res = identifier.identify_frame(&frame, &[detection]);
        for id in &res.identified {
            for c in id.ranking.iter() {
                info!("{}: {} {:?}", path.display(), c.catalog_id, c.metric);
            }
        }
    }
    Ok(())
}
