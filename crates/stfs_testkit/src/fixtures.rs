//! Test fixtures and filesystem helpers.
//!
//! Provides test filesystems over each kind of medium, the content
//! pipelines to run them with, and sample content.

use crate::drive::StTape;
use std::path::{Path, PathBuf};
use stfs_core::pipeline::{AesGcmCipher, EncryptionKey, HmacSigner};
use stfs_core::{Config, Filesystem, Pipeline, SourceEntry};
use stfs_storage::{DrivePath, Geometry, InMemoryContainer, MediumSource, VirtualTape};
use tempfile::TempDir;

/// Record size used by the fixtures. Small, so tests cross records.
pub const TEST_RECORD_SIZE: u64 = 4;

/// The medium under a test filesystem.
#[derive(Debug, Clone)]
pub enum TestMedium {
    /// An in-memory container.
    Memory(InMemoryContainer),
    /// A virtual tape.
    Tape(VirtualTape),
    /// A virtual tape read the way the `st` driver reads.
    StTape(StTape),
    /// A container file in a temporary directory.
    File(PathBuf),
}

impl TestMedium {
    fn source(&self) -> Box<dyn MediumSource> {
        let geometry = geometry();
        match self {
            Self::Memory(container) => Box::new(container.clone()),
            Self::Tape(tape) => Box::new(tape.clone()),
            Self::StTape(drive) => Box::new(drive.clone()),
            Self::File(path) => Box::new(DrivePath::new(path.clone(), geometry)),
        }
    }
}

/// A test filesystem with automatic cleanup.
pub struct TestFilesystem {
    /// The filesystem instance.
    pub fs: Filesystem,
    /// The medium it runs on.
    pub medium: TestMedium,
    pipeline: Pipeline,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestFilesystem {
    /// Creates an initialized filesystem on an in-memory container.
    pub fn memory() -> Self {
        Self::memory_with(Pipeline::identity())
    }

    /// Creates an initialized in-memory filesystem with a pipeline.
    pub fn memory_with(pipeline: Pipeline) -> Self {
        let medium = TestMedium::Memory(InMemoryContainer::new(geometry()));
        Self::create(medium, pipeline, None)
    }

    /// Creates an initialized filesystem on a virtual tape.
    pub fn tape() -> Self {
        Self::tape_with(Pipeline::identity())
    }

    /// Creates an initialized virtual-tape filesystem with a pipeline.
    pub fn tape_with(pipeline: Pipeline) -> Self {
        let medium = TestMedium::Tape(VirtualTape::new(geometry()));
        Self::create(medium, pipeline, None)
    }

    /// Creates an initialized filesystem on a tape that reports end of
    /// data as a zero-length read.
    pub fn st_tape() -> Self {
        let medium = TestMedium::StTape(StTape::new(VirtualTape::new(geometry())));
        Self::create(medium, Pipeline::identity(), None)
    }

    /// Creates an initialized filesystem on a container file.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let medium = TestMedium::File(temp_dir.path().join("medium.tar"));
        Self::create(medium, Pipeline::identity(), Some(temp_dir))
    }

    fn create(medium: TestMedium, pipeline: Pipeline, temp_dir: Option<TempDir>) -> Self {
        let fs = open_on(&medium, pipeline.clone());
        fs.initialize().expect("Failed to initialize filesystem");
        Self {
            fs,
            medium,
            pipeline,
            _temp_dir: temp_dir,
        }
    }

    /// Opens a second filesystem on the same medium, with an empty index.
    pub fn reopen(&self) -> Filesystem {
        open_on(&self.medium, self.pipeline.clone())
    }

    /// Returns the in-memory container, if this filesystem uses one.
    pub fn container(&self) -> Option<&InMemoryContainer> {
        match &self.medium {
            TestMedium::Memory(container) => Some(container),
            _ => None,
        }
    }

    /// Returns the virtual tape, if this filesystem uses one.
    pub fn virtual_tape(&self) -> Option<&VirtualTape> {
        match &self.medium {
            TestMedium::Tape(tape) => Some(tape),
            TestMedium::StTape(drive) => Some(drive.tape()),
            _ => None,
        }
    }

    /// Returns the container file path, if this filesystem uses one.
    pub fn path(&self) -> Option<&Path> {
        match &self.medium {
            TestMedium::File(path) => Some(path),
            _ => None,
        }
    }
}

impl std::ops::Deref for TestFilesystem {
    type Target = Filesystem;

    fn deref(&self) -> &Self::Target {
        &self.fs
    }
}

/// Geometry of every fixture medium.
pub fn geometry() -> Geometry {
    Geometry::new(TEST_RECORD_SIZE).expect("Invalid test geometry")
}

/// Configuration matching [`geometry`].
pub fn test_config() -> Config {
    Config::new().record_size(TEST_RECORD_SIZE)
}

fn open_on(medium: &TestMedium, pipeline: Pipeline) -> Filesystem {
    let source = medium.source();
    Filesystem::open(BoxedSource(source), test_config())
        .expect("Failed to open filesystem")
        .with_pipeline(pipeline)
}

struct BoxedSource(Box<dyn MediumSource>);

impl MediumSource for BoxedSource {
    fn open(&self) -> stfs_storage::StorageResult<Box<dyn stfs_storage::Medium>> {
        self.0.open()
    }

    fn describe(&self) -> String {
        self.0.describe()
    }
}

/// Every combination of compression, encryption and signature, the
/// identity pipeline included, with a label for assertion messages.
pub fn pipeline_matrix() -> Vec<(&'static str, Pipeline)> {
    let key = EncryptionKey::from_bytes(&[7u8; 32]).expect("Invalid test key");
    let compressor = || test_config().compressor();
    let cipher = || AesGcmCipher::new(&key);
    let signer = || HmacSigner::new(b"test signing secret").expect("Invalid test secret");

    vec![
        ("identity", Pipeline::identity()),
        ("zstd", Pipeline::identity().with_compressor(compressor())),
        ("aes", Pipeline::identity().with_cipher(cipher())),
        ("hmac", Pipeline::identity().with_signer(signer())),
        (
            "zstd+aes",
            Pipeline::identity()
                .with_compressor(compressor())
                .with_cipher(cipher()),
        ),
        (
            "zstd+hmac",
            Pipeline::identity()
                .with_compressor(compressor())
                .with_signer(signer()),
        ),
        (
            "aes+hmac",
            Pipeline::identity()
                .with_cipher(cipher())
                .with_signer(signer()),
        ),
        (
            "zstd+aes+hmac",
            Pipeline::identity()
                .with_compressor(compressor())
                .with_cipher(cipher())
                .with_signer(signer()),
        ),
    ]
}

/// A small tree: a directory with a file, a nested directory with a
/// larger file, a symlink and a top-level file.
pub fn sample_tree() -> Vec<SourceEntry> {
    vec![
        SourceEntry::directory("docs").with_mtime(1_700_000_000),
        SourceEntry::file("docs/readme.txt", b"read me first\n".to_vec()).with_mode(0o644),
        SourceEntry::directory("docs/reports"),
        SourceEntry::file("docs/reports/q1.csv", sample_content(3000)),
        SourceEntry::symlink("docs/latest", "reports/q1.csv"),
        SourceEntry::file("notes.txt", b"remember the milk".to_vec()),
    ]
}

/// Deterministic content of `len` bytes that compresses moderately.
pub fn sample_content(len: usize) -> Vec<u8> {
    (0..len).map(|i| b"0123456789abcdef,\n"[i % 18] ^ (i / 97) as u8).collect()
}
