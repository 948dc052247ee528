//! Sequential reference fetch: the known-good baseline.

use dlbench_adapters::{Fetcher, read_text, recreate_dir};
use dlbench_domain::{local_file_name, parse_manifest};
use dlbench_error::Result;
use dlbench_types::Manifest;
use std::path::{Path, PathBuf};

pub fn load_manifest(path: &Path) -> Result<Manifest> {
    let text = read_text(path)?;
    Ok(parse_manifest(&text))
}

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub manifest_path: PathBuf,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    /// Written files, in manifest order.
    pub files: Vec<PathBuf>,
    pub bytes: u64,
}

pub struct ReferenceFetchUseCase<F: Fetcher> {
    fetcher: F,
}

impl<F: Fetcher> ReferenceFetchUseCase<F> {
    pub fn new(fetcher: F) -> Self {
        Self { fetcher }
    }

    /// Recreate `output_dir` and fetch every manifest entry into it, one at a time.
    ///
    /// The first failure aborts the rest of the manifest: a partial reference
    /// set cannot support a comparison.
    pub fn execute(&self, req: &FetchRequest) -> Result<FetchOutcome> {
        let manifest = load_manifest(&req.manifest_path)?;
        recreate_dir(&req.output_dir)?;

        let mut files = Vec::with_capacity(manifest.len());
        let mut bytes = 0;

        for id in manifest.entries() {
            let dest = req.output_dir.join(local_file_name(id));
            bytes += self.fetcher.fetch(&id.url(), &dest)?;
            files.push(dest);
        }

        tracing::info!(
            manifest = %req.manifest_path.display(),
            dir = %req.output_dir.display(),
            files = files.len(),
            bytes,
            "reference set fetched"
        );

        Ok(FetchOutcome { files, bytes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dlbench_adapters::AdapterError;
    use dlbench_error::{ErrorKind, HarnessError};
    use std::cell::RefCell;
    use std::fs;

    /// Writes the URL as the body; fails on any URL containing `fail_on`.
    struct EchoFetcher {
        fail_on: Option<&'static str>,
        seen: RefCell<Vec<String>>,
    }

    impl EchoFetcher {
        fn new(fail_on: Option<&'static str>) -> Self {
            Self {
                fail_on,
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl Fetcher for EchoFetcher {
        fn fetch(&self, url: &str, dest: &Path) -> std::result::Result<u64, AdapterError> {
            self.seen.borrow_mut().push(url.to_string());
            if self.fail_on.is_some_and(|f| url.contains(f)) {
                return Err(AdapterError::Http {
                    url: url.to_string(),
                    message: "HTTP status server error (500 Internal Server Error)".into(),
                });
            }
            fs::write(dest, url).map_err(|source| AdapterError::Io {
                path: dest.to_path_buf(),
                source,
            })?;
            Ok(url.len() as u64)
        }
    }

    fn listing(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn fetches_one_file_per_entry_with_sanitized_names() {
        let tmp = tempfile::tempdir().unwrap();
        let manifest = tmp.path().join("small.txt");
        fs::write(&manifest, "a/b.txt\n\nc.txt\n").unwrap();

        let fetcher = EchoFetcher::new(None);
        let usecase = ReferenceFetchUseCase::new(fetcher);
        let req = FetchRequest {
            manifest_path: manifest,
            output_dir: tmp.path().join("legit_small"),
        };

        let outcome = usecase.execute(&req).unwrap();

        assert_eq!(listing(&req.output_dir), vec!["a_b.txt", "c.txt"]);
        assert_eq!(
            fs::read_to_string(req.output_dir.join("a_b.txt")).unwrap(),
            "http://a/b.txt"
        );
        assert_eq!(outcome.files.len(), 2);
        assert_eq!(
            *usecase.fetcher.seen.borrow(),
            vec!["http://a/b.txt".to_string(), "http://c.txt".to_string()]
        );
    }

    #[test]
    fn second_run_leaves_no_stale_files() {
        let tmp = tempfile::tempdir().unwrap();
        let manifest = tmp.path().join("m.txt");
        let out = tmp.path().join("legit_m");
        let usecase = ReferenceFetchUseCase::new(EchoFetcher::new(None));
        let req = FetchRequest {
            manifest_path: manifest.clone(),
            output_dir: out.clone(),
        };

        fs::write(&manifest, "h/one.txt\nh/two.txt\n").unwrap();
        usecase.execute(&req).unwrap();
        assert_eq!(listing(&out), vec!["h_one.txt", "h_two.txt"]);

        fs::write(&manifest, "h/three.txt\n").unwrap();
        usecase.execute(&req).unwrap();
        assert_eq!(listing(&out), vec!["h_three.txt"]);
    }

    #[test]
    fn first_failure_aborts_remaining_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let manifest = tmp.path().join("m.txt");
        fs::write(&manifest, "h/1\nh/2\nh/3\n").unwrap();

        let usecase = ReferenceFetchUseCase::new(EchoFetcher::new(Some("h/2")));
        let err = usecase
            .execute(&FetchRequest {
                manifest_path: manifest,
                output_dir: tmp.path().join("legit_m"),
            })
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Network);
        assert!(err.to_string().contains("http://h/2"));
        assert_eq!(usecase.fetcher.seen.borrow().len(), 2);
        assert_eq!(listing(&tmp.path().join("legit_m")), vec!["h_1"]);
    }

    #[test]
    fn missing_manifest_is_filesystem_error() {
        let tmp = tempfile::tempdir().unwrap();
        let usecase = ReferenceFetchUseCase::new(EchoFetcher::new(None));
        let err = usecase
            .execute(&FetchRequest {
                manifest_path: tmp.path().join("absent.txt"),
                output_dir: tmp.path().join("legit_absent"),
            })
            .unwrap_err();
        assert!(matches!(err, HarnessError::Filesystem { .. }), "got {err:?}");
    }

    #[test]
    fn empty_manifest_yields_empty_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let manifest = tmp.path().join("empty.txt");
        fs::write(&manifest, "\n  \n").unwrap();
        let out = tmp.path().join("legit_empty");

        let outcome = ReferenceFetchUseCase::new(EchoFetcher::new(None))
            .execute(&FetchRequest {
                manifest_path: manifest,
                output_dir: out.clone(),
            })
            .unwrap();

        assert!(outcome.files.is_empty());
        assert!(out.is_dir());
        assert!(listing(&out).is_empty());
    }
}
