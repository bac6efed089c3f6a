//! Adaptive sub-batching (§4.3 "core novelty"): partitions a request list
//! into chunks that each stay under the provider's maximum serialized
//! payload size, greedily, preserving submission order within a chunk.

use crate::types::LlmRequest;

/// Builds a stable `custom_id = "{stage_tag}_{index}_{hash(payload)}"`,
/// optionally namespaced with `chunk_{i}_` when sub-batching is active.
pub fn custom_id(stage_tag: &str, index: usize, request: &LlmRequest, chunk_index: Option<usize>) -> String {
    let payload_repr = format!("{}:{}:{}", request.barcode, request.model, request.messages.len());
    let hash = blake3::hash(payload_repr.as_bytes()).to_hex();
    let hash8 = &hash.as_str()[..8];
    match chunk_index {
        Some(chunk) => format!("chunk_{chunk}_{stage_tag}_{index}_{hash8}"),
        None => format!("{stage_tag}_{index}_{hash8}"),
    }
}

/// Greedily partitions `requests` into chunks each estimated at or below
/// `max_bytes`. A single request larger than `max_bytes` still becomes its
/// own (oversized) chunk rather than being dropped.
pub fn partition_into_chunks(requests: &[LlmRequest], max_bytes: usize) -> Vec<Vec<usize>> {
    let mut chunks: Vec<Vec<usize>> = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    let mut current_bytes = 0usize;

    for (idx, request) in requests.iter().enumerate() {
        let size = request.estimated_bytes();
        if !current.is_empty() && current_bytes + size > max_bytes {
            chunks.push(std::mem::take(&mut current));
            current_bytes = 0;
        }
        current.push(idx);
        current_bytes += size;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentPart, LlmRequest, Message};

    fn request_with_bytes(barcode: &str, bytes: usize) -> LlmRequest {
        LlmRequest::new(
            barcode,
            "stage1",
            "model",
            vec![Message::user(vec![ContentPart::image("image/png", "A".repeat(bytes))])],
        )
    }

    #[test]
    fn partitions_when_total_exceeds_limit() {
        let requests: Vec<LlmRequest> = (0..50).map(|i| request_with_bytes(&i.to_string(), 1_000_000)).collect();
        let chunks = partition_into_chunks(&requests, 25 * 1_000_000);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 25);
        assert_eq!(chunks[1].len(), 25);
    }

    #[test]
    fn single_chunk_when_under_limit() {
        let requests: Vec<LlmRequest> = (0..5).map(|i| request_with_bytes(&i.to_string(), 1_000)).collect();
        let chunks = partition_into_chunks(&requests, 40 * 1024 * 1024);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 5);
    }

    #[test]
    fn custom_id_is_namespaced_per_chunk() {
        let req = request_with_bytes("b1", 10);
        let plain = custom_id("stage1", 0, &req, None);
        let chunked = custom_id("stage1", 0, &req, Some(2));
        assert!(plain.starts_with("stage1_0_"));
        assert!(chunked.starts_with("chunk_2_stage1_0_"));
    }
}
