//! Variable sink populated by body decomposition
//!
//! One sink per transaction, exclusively owned by it and discarded after the
//! verdict. The rule engine reads the categories; the decomposer writes them.

use std::collections::HashMap;

use tempfile::NamedTempFile;

/// Decomposed request variables, organized by category.
#[derive(Debug, Default)]
pub struct TransactionVariables {
    /// Form field name -> raw value bytes; a name may repeat, addition order
    /// preserved. Values are stored byte-for-byte with no charset decoding,
    /// so embedded NULs from wide encodings pass through unchanged.
    post_fields: Vec<(String, Vec<u8>)>,
    /// Uploaded file names, in part order
    files: Vec<String>,
    /// Byte count per distinct file name, last write wins
    file_sizes: HashMap<String, u64>,
    /// Form-field names of file parts, parallel to `files`
    files_names: Vec<String>,
    /// On-disk temp paths; empty when temp storage is disabled
    files_tmp_names: Vec<String>,
    /// Running total of content bytes across all parts, fields and files alike
    combined_file_size: u64,
    /// Part name -> raw "Name: Value" header lines, for every part
    part_headers: HashMap<String, Vec<String>>,
    /// Guards keeping temp files alive for the transaction; dropped with the
    /// sink, removing the files (best-effort deletion policy)
    tmp_guards: Vec<NamedTempFile>,
}

impl TransactionVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_post_field(&mut self, name: &str, value: &[u8]) {
        self.post_fields.push((name.to_string(), value.to_vec()));
    }

    pub fn add_file(&mut self, filename: &str, field_name: &str, size: u64) {
        self.files.push(filename.to_string());
        self.file_sizes.insert(filename.to_string(), size);
        self.files_names.push(field_name.to_string());
    }

    pub fn add_tmp_file(&mut self, tmp: NamedTempFile) {
        self.files_tmp_names
            .push(tmp.path().display().to_string());
        self.tmp_guards.push(tmp);
    }

    pub fn add_part_header(&mut self, part_name: &str, raw_line: &str) {
        self.part_headers
            .entry(part_name.to_string())
            .or_default()
            .push(raw_line.to_string());
    }

    /// Update the running total after a part's content has been consumed
    pub fn add_part_bytes(&mut self, len: u64) {
        self.combined_file_size += len;
    }

    pub fn post_fields(&self) -> &[(String, Vec<u8>)] {
        &self.post_fields
    }

    /// Values for one field name, in addition order
    pub fn post_field_values(&self, name: &str) -> Vec<&[u8]> {
        self.post_fields
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
            .collect()
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn file_size(&self, filename: &str) -> Option<u64> {
        self.file_sizes.get(filename).copied()
    }

    pub fn files_names(&self) -> &[String] {
        &self.files_names
    }

    pub fn files_tmp_names(&self) -> &[String] {
        &self.files_tmp_names
    }

    pub fn combined_file_size(&self) -> u64 {
        self.combined_file_size
    }

    pub fn part_headers(&self) -> &HashMap<String, Vec<String>> {
        &self.part_headers
    }
}
