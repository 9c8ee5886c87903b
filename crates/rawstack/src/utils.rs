use {
    anyhow::Context,
    std::path::{Path, PathBuf},
    tracing::debug_span,
};

#[extension_traits::extension(pub(crate) trait PathReadWrite)]
impl<T: AsRef<std::path::Path>> T {
    fn open_file_write(&self) -> anyhow::Result<(PathBuf, std::fs::File)> {
        debug_span!("open_file_write", path=%self.as_ref().display()).in_scope(|| {
            Ok(()).and_then(|_| {
                if let Some(parent) = self.as_ref().parent() {
                    std::fs::create_dir_all(parent).context("creating full path for output file")?;
                }
                std::fs::OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(self)
                    .with_context(|| format!("opening file for writing at [{}]", self.as_ref().display()))
                    .map(|file| (self.as_ref().to_owned(), file))
            })
        })
    }
}

/// Canonical cache key for an input path. Canonicalization needs the file to
/// exist; for anything else the display form is canonical enough.
pub fn canonical_url(path: &Path) -> String {
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| path.to_owned())
        .display()
        .to_string()
}

/// Splits `input` into at most `chunks` contiguous batches of near-equal
/// length, preserving order.
pub fn chunk_into<T>(input: Vec<T>, chunks: usize) -> Vec<Vec<T>> {
    let chunks = chunks.max(1);
    let chunk_len = input.len().div_ceil(chunks).max(1);
    let mut buf: Vec<Vec<T>> = vec![];
    for element in input {
        match buf.last_mut().filter(|last| last.len() < chunk_len) {
            Some(last) => last.push(element),
            None => buf.push(vec![element]),
        }
    }
    buf
}

#[test]
fn test_chunk_into() {
    assert_eq!(
        chunk_into((0u8..6).collect(), 3),
        vec![vec![0u8, 1], vec![2u8, 3], vec![4u8, 5]]
    );
    assert_eq!(chunk_into((0u8..5).collect(), 2), vec![vec![0u8, 1, 2], vec![3u8, 4]]);
    assert_eq!(chunk_into(Vec::<u8>::new(), 4), Vec::<Vec<u8>>::new());
    assert_eq!(chunk_into(vec![1u8], 8), vec![vec![1u8]]);
}
