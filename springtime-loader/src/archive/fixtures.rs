use crate::archive::manifest::MANIFEST_NAME;
use tar::{Builder, EntryType, Header};

/// In-memory tar stream builder for tests.
pub struct TarFixture {
    builder: Builder<Vec<u8>>,
}

impl TarFixture {
    pub fn new() -> Self {
        Self {
            builder: Builder::new(Vec::new()),
        }
    }

    pub fn manifest(self, content: &str) -> Self {
        self.file(MANIFEST_NAME, content.as_bytes())
    }

    pub fn file(mut self, path: &str, bytes: &[u8]) -> Self {
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_size(bytes.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        header.set_cksum();
        self.builder
            .append_data(&mut header, path, bytes)
            .expect("append file");
        self
    }

    pub fn directory(mut self, path: &str) -> Self {
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Directory);
        header.set_size(0);
        header.set_mode(0o755);
        header.set_mtime(0);
        header.set_cksum();
        self.builder
            .append_data(&mut header, path, std::io::empty())
            .expect("append directory");
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.builder.into_inner().expect("tar bytes")
    }
}
