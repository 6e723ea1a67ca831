use crate::object::Object;

/// blobs carry no structure beyond raw bytes; this just names the construction
/// so call sites read `blob::new(content)` rather than reaching into the enum directly
pub fn new(content: impl Into<Vec<u8>>) -> Object {
    Object::Blob(content.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_raw_bytes() {
        let obj = new(b"content".to_vec());
        assert_eq!(obj.as_blob().unwrap(), b"content");
    }
}
