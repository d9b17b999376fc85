use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::env::{EnvLookup, EnvStore, SystemEnv, TargetEnv};
use crate::error::Error;
use crate::model::{EnvMap, Entry, KeyParsingMode, LoadReport, ParseOptions, SubstitutionMode};
use crate::parser::parse_str_with_source;

const DEFAULT_FILE: &str = ".env";

/// Load `.env` from the current working directory into the process
/// environment, keeping variables that are already set.
///
/// # Safety
///
/// Mutates the process environment; see [`TargetEnv::process`].
pub unsafe fn dotenv() -> Result<LoadReport, Error> {
    // SAFETY: forwarded to our caller.
    unsafe { load(true, std::iter::empty::<&Path>()) }
}

/// Load env files into the process environment without replacing variables
/// that are already set. No paths means `.env`.
///
/// # Safety
///
/// Mutates the process environment; see [`TargetEnv::process`].
pub unsafe fn load<I, P>(strict: bool, paths: I) -> Result<LoadReport, Error>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    // SAFETY: forwarded to our caller.
    let target = unsafe { TargetEnv::process() };
    EnvLoader::new()
        .paths(paths)
        .strict(strict)
        .target(target)
        .load()
}

/// Load env files into the process environment, replacing variables that are
/// already set. No paths means `.env`.
///
/// # Safety
///
/// Mutates the process environment; see [`TargetEnv::process`].
pub unsafe fn overload<I, P>(strict: bool, paths: I) -> Result<LoadReport, Error>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    // SAFETY: forwarded to our caller.
    let target = unsafe { TargetEnv::process() };
    EnvLoader::new()
        .paths(paths)
        .strict(strict)
        .override_existing(true)
        .target(target)
        .load()
}

/// Read env files into a map without touching the process environment.
/// Later files win. No paths means `.env`.
pub fn read<I, P>(strict: bool, paths: I) -> Result<EnvMap, Error>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    EnvLoader::new()
        .paths(paths)
        .strict(strict)
        .read_map_with(&SystemEnv)
}

/// Builder-style env file loader.
#[derive(Debug, Clone)]
pub struct EnvLoader {
    paths: Vec<PathBuf>,
    base_dir: Option<PathBuf>,
    override_existing: bool,
    strict: bool,
    options: ParseOptions,
    target: TargetEnv,
}

/// Merged result of decoding every configured file.
struct Batch {
    entries: Vec<Entry>,
    files_read: usize,
    files_skipped: usize,
}

impl EnvLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.paths.push(path.as_ref().to_path_buf());
        self
    }

    pub fn paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.paths
            .extend(paths.into_iter().map(|path| path.as_ref().to_path_buf()));
        self
    }

    /// Resolve relative paths against `dir` instead of the working directory.
    pub fn base_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.base_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn override_existing(mut self, override_existing: bool) -> Self {
        self.override_existing = override_existing;
        self
    }

    /// Abort on the first file that cannot be read or parsed (default), or
    /// skip such files and fail only when none loaded.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn substitution_mode(mut self, substitution_mode: SubstitutionMode) -> Self {
        self.options.substitution_mode = substitution_mode;
        self
    }

    pub fn key_parsing_mode(mut self, key_parsing_mode: KeyParsingMode) -> Self {
        self.options.key_parsing_mode = key_parsing_mode;
        self
    }

    pub fn target(mut self, target: TargetEnv) -> Self {
        self.target = target;
        self
    }

    pub fn overrides_existing(&self) -> bool {
        self.override_existing
    }

    pub fn target_env(&self) -> &TargetEnv {
        &self.target
    }

    pub fn into_target(self) -> TargetEnv {
        self.target
    }

    /// Decode and merge every file, resolving placeholders against the target.
    pub fn read(&self) -> Result<Vec<Entry>, Error> {
        self.read_with(&self.target)
    }

    /// Decode and merge every file, resolving placeholders against `env`.
    pub fn read_with(&self, env: &impl EnvLookup) -> Result<Vec<Entry>, Error> {
        Ok(self.collect(env)?.entries)
    }

    pub fn read_map(&self) -> Result<EnvMap, Error> {
        self.read_map_with(&self.target)
    }

    pub fn read_map_with(&self, env: &impl EnvLookup) -> Result<EnvMap, Error> {
        Ok(self
            .read_with(env)?
            .into_iter()
            .map(|entry| (entry.key, entry.value))
            .collect())
    }

    /// Apply every file to the configured target.
    pub fn load(&mut self) -> Result<LoadReport, Error> {
        let mut target = std::mem::take(&mut self.target);
        let result = self.load_into(&mut target);
        self.target = target;
        result
    }

    /// Apply every file to `store`. Nothing is written unless every
    /// required file decoded.
    pub fn load_into<S: EnvStore>(&self, store: &mut S) -> Result<LoadReport, Error> {
        let batch = self.collect(&*store)?;
        let mut report = LoadReport {
            files_read: batch.files_read,
            files_skipped: batch.files_skipped,
            ..LoadReport::default()
        };

        for entry in batch.entries {
            if !self.override_existing && store.contains_key(&entry.key) {
                report.skipped_existing += 1;
                tracing::debug!(key = %entry.key, "skipping existing key");
                continue;
            }

            store.set_var(&entry.key, &entry.value);
            report.loaded += 1;
        }

        tracing::debug!(
            loaded = report.loaded,
            skipped_existing = report.skipped_existing,
            files_read = report.files_read,
            "applied env files"
        );
        Ok(report)
    }

    fn collect(&self, env: &dyn EnvLookup) -> Result<Batch, Error> {
        let mut merged_entries = Vec::new();
        let mut by_key = HashMap::<String, usize>::new();
        let mut files_read = 0usize;
        let mut files_skipped = 0usize;

        for path in self.effective_paths() {
            let lookup = BatchLookup {
                merged: &merged_entries,
                by_key: &by_key,
                env,
                earlier_files_first: self.override_existing,
            };
            let parsed = match self.read_file(&path, &lookup) {
                Ok(parsed) => parsed,
                Err(err) if self.strict => return Err(err),
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "skipping env file");
                    files_skipped += 1;
                    continue;
                }
            };
            files_read += 1;
            tracing::debug!(path = %path.display(), entries = parsed.len(), "read env file");

            for entry in parsed {
                if let Some(existing_idx) = by_key.get(&entry.key).copied() {
                    merged_entries[existing_idx] = entry;
                } else {
                    by_key.insert(entry.key.clone(), merged_entries.len());
                    merged_entries.push(entry);
                }
            }
        }

        if files_read == 0 {
            return Err(Error::NoFileLoaded);
        }

        Ok(Batch {
            entries: merged_entries,
            files_read,
            files_skipped,
        })
    }

    fn read_file(&self, path: &Path, lookup: &dyn EnvLookup) -> Result<Vec<Entry>, Error> {
        let bytes = std::fs::read(path)?;
        let content = std::str::from_utf8(&bytes)?;
        Ok(parse_str_with_source(
            content,
            Some(path),
            self.options,
            lookup,
        )?)
    }

    fn effective_paths(&self) -> Vec<PathBuf> {
        let paths = if self.paths.is_empty() {
            vec![PathBuf::from(DEFAULT_FILE)]
        } else {
            self.paths.clone()
        };

        match &self.base_dir {
            Some(dir) => paths
                .into_iter()
                .map(|path| if path.is_relative() { dir.join(path) } else { path })
                .collect(),
            None => paths,
        }
    }
}

impl Default for EnvLoader {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            base_dir: None,
            override_existing: false,
            strict: true,
            options: ParseOptions::default(),
            target: TargetEnv::memory(),
        }
    }
}

/// Placeholder lookup while decoding one file of a batch.
///
/// Earlier files are visible as if they had already been applied: with
/// override they shadow the environment, without it the environment wins.
struct BatchLookup<'a> {
    merged: &'a [Entry],
    by_key: &'a HashMap<String, usize>,
    env: &'a dyn EnvLookup,
    earlier_files_first: bool,
}

impl BatchLookup<'_> {
    fn earlier(&self, key: &str) -> Option<String> {
        self.by_key
            .get(key)
            .map(|idx| self.merged[*idx].value.clone())
    }
}

impl EnvLookup for BatchLookup<'_> {
    fn get_var(&self, key: &str) -> Option<String> {
        if self.earlier_files_first {
            self.earlier(key).or_else(|| self.env.get_var(key))
        } else {
            self.env.get_var(key).or_else(|| self.earlier(key))
        }
    }
}
