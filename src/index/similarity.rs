//! 向量相似度工具

/// 余弦相似度；任一向量为零向量或维度不一致时返回 0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// L2 归一化
pub fn normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

/// 两个向量的归一化均值，用于合并后刷新节点 embedding
pub fn normalized_mean(a: &[f32], b: &[f32]) -> Vec<f32> {
    if a.len() != b.len() {
        return a.to_vec();
    }
    let mean = normalize(a.to_vec())
        .iter()
        .zip(normalize(b.to_vec()).iter())
        .map(|(x, y)| (x + y) / 2.0)
        .collect();
    normalize(mean)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        let c = vec![0.0, 1.0, 0.0];
        assert_eq!(cosine_similarity(&a, &b), 1.0);
        assert_eq!(cosine_similarity(&a, &c), 0.0);
        assert_eq!(cosine_similarity(&a, &[0.0, 0.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&a, &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_normalized_mean_is_unit_length() {
        let mean = normalized_mean(&[1.0, 0.0], &[0.0, 1.0]);
        let norm: f32 = mean.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
        assert!((mean[0] - mean[1]).abs() < 1e-6);
    }
}
