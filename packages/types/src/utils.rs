use std::sync::Arc;

#[inline]
pub fn ptr_key<T>(arc: &Arc<T>) -> usize {
    Arc::as_ptr(arc) as usize
}
