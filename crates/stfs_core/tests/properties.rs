//! Property tests over generated entries and positions.

use proptest::prelude::*;
use stfs_core::{SourceEntry, ROOT};
use stfs_storage::BLOCK_SIZE;
use stfs_testkit::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn positions_map_to_block_offsets((geometry, position) in position_strategy()) {
        let offset = geometry.offset_of(position);
        prop_assert_eq!(offset % BLOCK_SIZE, 0);
        prop_assert_eq!(geometry.position_at(offset), position);
        // Any byte inside the block rounds up to the next one.
        prop_assert!(geometry.position_after(offset + 1) > position);
    }

    #[test]
    fn archived_files_read_back_after_reindex(files in file_set_strategy()) {
        let fs = TestFilesystem::memory();
        fs.archive(&files).unwrap();

        let reopened = fs.reopen();
        let report = reopened.reindex().unwrap();
        prop_assert_eq!(report.applied, files.len() as u64 + 1);

        for file in &files {
            let mut expected = Vec::new();
            let source = file.content.as_ref().unwrap();
            std::io::copy(&mut source.open().unwrap(), &mut expected).unwrap();

            let mut content = Vec::new();
            reopened.read_file(&file.header.name, &mut content).unwrap();
            prop_assert_eq!(content, expected);
        }
    }

    #[test]
    fn headers_survive_the_medium(header in header_strategy()) {
        let fs = TestFilesystem::memory();
        let entry = SourceEntry {
            content: header.kind.is_regular().then(|| {
                std::sync::Arc::new(b"payload".to_vec()) as std::sync::Arc<dyn stfs_core::ContentSource>
            }),
            header: header.clone(),
        };
        fs.archive(&[entry]).unwrap();

        let reopened = fs.reopen();
        reopened.reindex().unwrap();
        let record = reopened.stat(&header.name).unwrap();
        prop_assert_eq!(record.kind, header.kind);
        prop_assert_eq!(record.mode, header.mode);
        prop_assert_eq!(record.uid, header.uid);
        prop_assert_eq!(record.mtime, header.mtime);
        prop_assert_eq!(&record.link_name, &header.link_name);
        prop_assert_eq!(reopened.tree(ROOT).unwrap().len(), 1);
    }
}
