use crate::util::sha256_hex;

/// Number of subjects folded into the text sent to the embedding model.
pub const EMBED_SUBJECT_LIMIT: usize = 20;

/// Fingerprint of the embeddable content of a book.
///
/// Subjects are sorted before serialization, so reordering them does not
/// change the fingerprint. A missing description hashes like an empty one.
pub fn content_fingerprint(description: Option<&str>, subjects: &[String]) -> String {
    let mut sorted = subjects.iter().map(String::as_str).collect::<Vec<&str>>();
    sorted.sort_unstable();
    let subjects_json = serde_json::to_string(&sorted).unwrap_or_else(|_| "[]".to_string());

    sha256_hex(&format!("{}|{}", description.unwrap_or(""), subjects_json))
}

pub fn normalize_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<&str>>().join(" ")
}

pub fn embedding_payload(title: &str, description: Option<&str>, subjects: &[String]) -> String {
    let mut parts = Vec::<String>::new();

    let title_norm = normalize_whitespace(title);
    if !title_norm.is_empty() {
        parts.push(title_norm);
    }

    if let Some(description) = description.filter(|value| !value.trim().is_empty()) {
        parts.push(description.trim().to_string());
    }

    if !subjects.is_empty() {
        let listed = subjects
            .iter()
            .take(EMBED_SUBJECT_LIMIT)
            .map(String::as_str)
            .collect::<Vec<&str>>()
            .join(", ");
        parts.push(format!("Subjects: {listed}"));
    }

    parts.join("\n")
}

/// Summary hash over `(book_id, model_id, fingerprint)` triples, which must
/// already be ordered by book id.
pub fn index_freshness_hash<'a, I>(entries: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str, &'a str)>,
{
    let combined = entries
        .into_iter()
        .map(|(book_id, model_id, fingerprint)| format!("{book_id}:{model_id}:{fingerprint}"))
        .collect::<Vec<String>>()
        .join("|");
    sha256_hex(&combined)
}

pub fn encode_embedding_blob(values: &[f32]) -> Vec<u8> {
    let mut out = Vec::<u8>::with_capacity(values.len() * 4);
    for value in values {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

pub fn decode_embedding_blob(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.is_empty() || blob.len() % 4 != 0 {
        return None;
    }

    let out = blob
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect::<Vec<f32>>();
    Some(out)
}

/// Scales `values` to unit length in place. Returns `false` and leaves the
/// input untouched when its norm is zero or not finite.
pub fn normalize_vector(values: &mut [f32]) -> bool {
    let squared_norm = values
        .iter()
        .map(|value| f64::from(*value) * f64::from(*value))
        .sum::<f64>();

    if !squared_norm.is_finite() || squared_norm <= 0.0 {
        return false;
    }

    let norm = squared_norm.sqrt() as f32;
    if norm == 0.0 {
        return false;
    }

    for value in values {
        *value /= norm;
    }
    true
}

pub fn dot(left: &[f32], right: &[f32]) -> f32 {
    left.iter()
        .zip(right.iter())
        .map(|(left_value, right_value)| left_value * right_value)
        .sum::<f32>()
}

/// Element-wise mean. `None` for an empty input or mixed dimensions.
pub fn mean_vector(vectors: &[Vec<f32>]) -> Option<Vec<f32>> {
    let first = vectors.first()?;
    let dims = first.len();
    if dims == 0 || vectors.iter().any(|vector| vector.len() != dims) {
        return None;
    }

    let mut sum = vec![0_f64; dims];
    for vector in vectors {
        for (slot, value) in sum.iter_mut().zip(vector.iter()) {
            *slot += f64::from(*value);
        }
    }

    let count = vectors.len() as f64;
    Some(sum.into_iter().map(|value| (value / count) as f32).collect())
}

/// `weight * left + (1 - weight) * right`. `None` on dimension mismatch.
pub fn weighted_merge(left: &[f32], right: &[f32], weight: f32) -> Option<Vec<f32>> {
    if left.len() != right.len() || left.is_empty() {
        return None;
    }

    let other = 1.0 - weight;
    Some(
        left.iter()
            .zip(right.iter())
            .map(|(left_value, right_value)| weight * left_value + other * right_value)
            .collect(),
    )
}

pub fn round_score(score: f32) -> f64 {
    (f64::from(score) * 10_000.0).round() / 10_000.0
}
