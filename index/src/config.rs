/// Tuning parameters for the HNSW graph. `dim` is fixed at 128 by
/// the descriptor type, carried here only so the config is self-describing.
#[derive(Clone, Copy, Debug)]
pub struct IndexConfig {
    pub dim: usize,
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    pub max_elements: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dim: facesrec_types::DESCRIPTOR_DIM,
            m: 16,
            ef_construction: 200,
            ef_search: 100,
            max_elements: 1_100_000,
        }
    }
}
