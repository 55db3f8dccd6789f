//! Deterministic content-hash embeddings.

use std::collections::HashMap;

use quarry_core::AppResult;

use crate::embed::provider::EmbeddingProvider;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Words too common to carry signal.
const STOP_WORDS: &[&str] = &[
    "the", "is", "at", "which", "on", "a", "an", "as", "are", "was", "were", "for", "to", "of",
    "in", "and", "or", "but", "with", "by", "from", "this", "that", "be", "have", "has", "had",
    "it", "its", "their", "they", "them", "what", "how", "can", "will", "does", "do",
];

/// Offline embedding provider hashing word and trigram features into a
/// fixed-dimension vector.
///
/// Not semantic: two texts score as similar only when they share
/// vocabulary. What it does guarantee is full determinism with no
/// network dependency, which makes it the default provider and the one
/// the test suite runs on. Identical text always produces an identical
/// unit vector.
#[derive(Debug)]
pub struct HashProvider {
    dimensions: usize,
}

impl HashProvider {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        let lower = text.to_lowercase();
        let mut word_freq: HashMap<&str, u32> = HashMap::new();
        for word in lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 2 && !STOP_WORDS.contains(w))
        {
            *word_freq.entry(word).or_insert(0) += 1;
        }

        for (word, freq) in &word_freq {
            // Trigram features spread each word over several dimensions,
            // letting morphologically close words overlap.
            for trigram in word.as_bytes().windows(3) {
                let dim = (fnv1a(trigram) as usize) % self.dimensions;
                vector[dim] += (*freq as f32).sqrt();
            }
            // The whole word gets one dimension with full weight.
            let dim = (fnv1a(word.as_bytes()) as usize) % self.dimensions;
            vector[dim] += *freq as f32;
        }

        normalize(&mut vector);
        vector
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, &b| {
        (hash ^ b as u64).wrapping_mul(FNV_PRIME)
    })
}

fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for HashProvider {
    fn provider_name(&self) -> &str {
        "hash"
    }

    fn model_name(&self) -> &str {
        "trigram-v1"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}
