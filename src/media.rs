/// What travels on every stage channel: a unit of media, or the end-of-stream
/// sentinel. A stage forwards exactly one `Eof` per generation and never
/// pushes data after it.
#[derive(Debug)]
pub enum Cmd<T> {
    Data(T),
    Eof,
}

impl<T> Cmd<T> {
    pub fn is_eof(&self) -> bool {
        matches!(self, Cmd::Eof)
    }
}

/// Byte view of a compressed unit, used by the output stage to account for
/// the destination's write budget.
pub trait Payload {
    fn data(&self) -> &[u8];

    fn size(&self) -> usize {
        self.data().len()
    }
}

impl Payload for Vec<u8> {
    fn data(&self) -> &[u8] {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_size() {
        let v = vec![0u8; 40];
        assert_eq!(v.size(), 40);
        assert_eq!(v.data().len(), 40);
    }

    #[test]
    fn test_cmd_is_eof() {
        assert!(Cmd::<u8>::Eof.is_eof());
        assert!(!Cmd::Data(1u8).is_eof());
    }
}
