use bovw::*;
use ndarray::{Array2, ArrayView2};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Toy SIFT: 4x4 grid of 4x4-pixel cells around each point, 8 gradient orientation bins
/// per cell, magnitude weighted.
struct GradientExtractor;

impl DescriptorExtractor for GradientExtractor {
    fn extract(
        &self,
        image: ArrayView2<f32>,
        xs: &[usize],
        ys: &[usize],
    ) -> BowResult<Array2<f32>> {
        let (h, w) = image.dim();
        let mut out = Array2::zeros((xs.len(), DESCRIPTOR_DIM));
        for (i, (&x, &y)) in xs.iter().zip(ys).enumerate() {
            for dy in 0..16 {
                for dx in 0..16 {
                    let r = (y + dy).saturating_sub(8).clamp(1, h - 2);
                    let c = (x + dx).saturating_sub(8).clamp(1, w - 2);
                    let gx = image[[r, c + 1]] - image[[r, c - 1]];
                    let gy = image[[r + 1, c]] - image[[r - 1, c]];
                    let angle = gy.atan2(gx) + std::f32::consts::PI;
                    let bin = ((angle / (2. * std::f32::consts::PI) * 8.) as usize).min(7);
                    let cell = (dy / 4) * 4 + dx / 4;
                    out[[i, cell * 8 + bin]] += (gx * gx + gy * gy).sqrt();
                }
            }
        }
        Ok(out)
    }
}

fn synthetic(class: usize, rng: &mut StdRng) -> Array2<u8> {
    let (h, w) = (rng.gen_range(48..96), rng.gen_range(48..96));
    let period = rng.gen_range(4..9);
    Array2::from_shape_fn((h, w), |(r, c)| {
        let on = match class {
            0 => (r / period) % 2 == 0,
            1 => (c / period) % 2 == 0,
            _ => (r / period + c / period) % 2 == 0,
        };
        let noise: u8 = rng.gen_range(0..40);
        if on {
            200 + noise
        } else {
            noise
        }
    })
}

fn main() -> BowResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let names = ["horizontal", "vertical", "checker"];
    let mut rng = StdRng::seed_from_u64(2024);
    let mut split = |per_class: usize| {
        let mut images = Vec::new();
        let mut labels = Vec::new();
        for (class, name) in names.iter().enumerate() {
            for _ in 0..per_class {
                images.push(synthetic(class, &mut rng));
                labels.push(*name);
            }
        }
        (images, labels)
    };
    let (train, train_labels) = split(10);
    let (test, test_labels) = split(5);

    // Build vocabulary from training images
    let config = VocabularyConfig {
        vocab_size: 20,
        max_descriptors: Some(2000),
        ..Default::default()
    };
    let vocab = Vocabulary::build(&train, &GradientExtractor, &config, &mut rng)?;
    info!("Vocabulary = {:?}", vocab);

    let bow_config = BagOfWordsConfig::default();
    let train_feats = get_bags_of_words(&train, &vocab, &GradientExtractor, &bow_config)?;
    let test_feats = get_bags_of_words(&test, &vocab, &GradientExtractor, &bow_config)?;
    let predicted =
        nearest_neighbor_classify(train_feats.view(), &train_labels, test_feats.view(), 3)?;
    report("bag of words", &predicted, &test_labels);

    // Tiny image baseline
    let tiny = TinyImageConfig {
        normalize: true,
        ..Default::default()
    };
    let train_feats = get_tiny_images(&train, &tiny)?;
    let test_feats = get_tiny_images(&test, &tiny)?;
    let predicted =
        nearest_neighbor_classify(train_feats.view(), &train_labels, test_feats.view(), 3)?;
    report("tiny images", &predicted, &test_labels);

    Ok(())
}

fn report(name: &str, predicted: &[&str], truth: &[&str]) {
    let correct = predicted.iter().zip(truth).filter(|(p, t)| p == t).count();
    println!("{}: {}/{} correct", name, correct, truth.len());
}
