//! Learned node vectors, keyed by node name.

use crate::error::{Error, Result};
use crate::linalg::cosine;
use crate::topk::top_k_by;
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::info;

/// Row `i` of `vectors` is the embedding of `names[i]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEmbeddings", into = "RawEmbeddings")]
pub struct Embeddings {
    names: Vec<String>,
    index: HashMap<String, usize>,
    vectors: Array2<f32>,
}

#[derive(Serialize, Deserialize)]
struct RawEmbeddings {
    names: Vec<String>,
    vectors: Array2<f32>,
}

impl TryFrom<RawEmbeddings> for Embeddings {
    type Error = Error;

    fn try_from(raw: RawEmbeddings) -> Result<Self> {
        Embeddings::new(raw.names, raw.vectors)
    }
}

impl From<Embeddings> for RawEmbeddings {
    fn from(e: Embeddings) -> Self {
        RawEmbeddings { names: e.names, vectors: e.vectors }
    }
}

impl Embeddings {
    pub fn new(names: Vec<String>, vectors: Array2<f32>) -> Result<Self> {
        if names.len() != vectors.nrows() {
            return Err(Error::InvalidConfig(format!(
                "{} names for {} vectors",
                names.len(),
                vectors.nrows()
            )));
        }
        let mut index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            if index.insert(name.clone(), i).is_some() {
                return Err(Error::InvalidConfig(format!("duplicate node name {name:?}")));
            }
        }
        Ok(Self { names, index, vectors })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.vectors.ncols()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn as_array(&self) -> &Array2<f32> {
        &self.vectors
    }

    pub fn into_array(self) -> Array2<f32> {
        self.vectors
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Vector for a node name.
    pub fn get(&self, name: &str) -> Result<ArrayView1<'_, f32>> {
        let &i = self.index.get(name).ok_or_else(|| Error::UnknownNode(name.to_string()))?;
        Ok(self.vectors.row(i))
    }

    /// Vector for a node index.
    pub fn vector(&self, node: usize) -> Result<ArrayView1<'_, f32>> {
        if node >= self.len() {
            return Err(Error::NodeOutOfRange { index: node, len: self.len() });
        }
        Ok(self.vectors.row(node))
    }

    /// The `k` nodes with the highest cosine similarity to `name`, excluding itself.
    pub fn most_similar(&self, name: &str, k: usize) -> Result<Vec<(String, f32)>> {
        let query = self.get(name)?;
        let &qi = self.index.get(name).ok_or_else(|| Error::UnknownNode(name.to_string()))?;
        let scores = self
            .vectors
            .rows()
            .into_iter()
            .enumerate()
            .filter(|&(i, _)| i != qi)
            .map(|(i, row)| (i, cosine(query, row) as f64));
        Ok(top_k_by(scores, k)
            .into_iter()
            .map(|(i, s)| (self.names[i].clone(), s as f32))
            .collect())
    }

    /// Write vectors in word2vec text format: a `<count> <dim>` header, then
    /// `<name> <v1> ... <vd>` per line.
    pub fn save_vectors(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(bad) = self.names.iter().find(|n| n.is_empty() || n.chars().any(char::is_whitespace)) {
            return Err(Error::InvalidConfig(format!(
                "node name {bad:?} cannot be written in word2vec format"
            )));
        }
        let mut w = BufWriter::new(File::create(path)?);
        writeln!(w, "{} {}", self.len(), self.dim())?;
        for (name, row) in self.names.iter().zip(self.vectors.rows()) {
            write!(w, "{name}")?;
            for x in row {
                write!(w, " {x}")?;
            }
            writeln!(w)?;
        }
        w.flush()?;
        info!(path = %path.display(), nodes = self.len(), dim = self.dim(), "saved vectors");
        Ok(())
    }

    /// Read vectors written by [`Embeddings::save_vectors`] (or gensim's text format).
    pub fn load_vectors(path: impl AsRef<Path>) -> Result<Self> {
        let mut reader = BufReader::new(File::open(path.as_ref())?);
        let mut buf = Vec::new();
        let mut line_no = 0;

        let (count, dim) = match next_line(&mut reader, &mut buf, &mut line_no)? {
            Some(header) => parse_header(header)?,
            None => return Err(Error::Parse { line: 1, message: "missing header".into() }),
        };
        let total = count.checked_mul(dim).ok_or_else(|| Error::Parse {
            line: 1,
            message: format!("header {count} x {dim} overflows"),
        })?;

        // The header is untrusted; the row-count check below catches a mismatch.
        let mut names = Vec::with_capacity(count.min(MAX_RESERVE));
        let mut data = Vec::with_capacity(total.min(MAX_RESERVE));
        while let Some(line) = next_line(&mut reader, &mut buf, &mut line_no)? {
            if line.trim().is_empty() {
                continue;
            }
            if names.len() == count {
                return Err(Error::Parse {
                    line: line_no,
                    message: format!("header declares {count} vectors, found more"),
                });
            }
            let mut fields = line.split_whitespace();
            let name = fields.next().unwrap_or_default().to_string();
            let before = data.len();
            for f in fields {
                let x = f.parse::<f32>().map_err(|e| Error::Parse {
                    line: line_no,
                    message: format!("invalid component {f:?}: {e}"),
                })?;
                data.push(x);
            }
            if data.len() - before != dim {
                return Err(Error::Parse {
                    line: line_no,
                    message: format!("expected {dim} components, got {}", data.len() - before),
                });
            }
            names.push(name);
        }
        if names.len() != count {
            return Err(Error::Parse {
                line: names.len() + 2,
                message: format!("header declares {count} vectors, found {}", names.len()),
            });
        }

        let vectors = Array2::from_shape_vec((count, dim), data)
            .map_err(|e| Error::Parse { line: 1, message: e.to_string() })?;
        Self::new(names, vectors)
    }
}

const MAX_RESERVE: usize = 1 << 16;

/// Next `\n`-terminated line as UTF-8, advancing the 1-based `line_no`.
fn next_line<'a, R: BufRead>(
    reader: &mut R,
    buf: &'a mut Vec<u8>,
    line_no: &mut usize,
) -> Result<Option<&'a str>> {
    buf.clear();
    if reader.read_until(b'\n', buf)? == 0 {
        return Ok(None);
    }
    *line_no += 1;
    let line = std::str::from_utf8(buf)
        .map_err(|e| Error::Parse { line: *line_no, message: format!("invalid UTF-8: {e}") })?;
    Ok(Some(line.trim_end_matches(['\n', '\r'])))
}

fn parse_header(header: &str) -> Result<(usize, usize)> {
    let bad = || Error::Parse { line: 1, message: format!("invalid header {header:?}") };
    let mut parts = header.split_whitespace();
    let count = parts.next().and_then(|s| s.parse().ok()).ok_or_else(bad)?;
    let dim = parts.next().and_then(|s| s.parse().ok()).ok_or_else(bad)?;
    Ok((count, dim))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn toy() -> Embeddings {
        Embeddings::new(
            vec!["a".into(), "b".into(), "c".into(), "d".into()],
            array![[1.0, 0.0], [0.9, 0.1], [0.0, 1.0], [-1.0, 0.0]],
        )
        .unwrap()
    }

    #[test]
    fn most_similar_excludes_query_and_sorts() {
        let e = toy();
        let got = e.most_similar("a", 3).unwrap();
        let names: Vec<&str> = got.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["b", "c", "d"]);
        assert!(got[2].1 < 0.0);
    }

    #[test]
    fn unknown_node_errors() {
        assert!(matches!(toy().get("zz"), Err(Error::UnknownNode(_))));
        assert!(matches!(toy().vector(9), Err(Error::NodeOutOfRange { index: 9, len: 4 })));
    }

    #[test]
    fn duplicate_names_rejected() {
        let err = Embeddings::new(vec!["a".into(), "a".into()], Array2::zeros((2, 1))).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn word2vec_text_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.txt");
        let e = toy();
        e.save_vectors(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("4 2\n"));

        let back = Embeddings::load_vectors(&path).unwrap();
        assert_eq!(back, e);
    }

    #[test]
    fn whitespace_names_cannot_be_saved() {
        let dir = tempfile::tempdir().unwrap();
        let e = Embeddings::new(vec!["a b".into()], Array2::zeros((1, 2))).unwrap();
        assert!(e.save_vectors(dir.path().join("v.txt")).is_err());
    }

    #[test]
    fn truncated_row_reports_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("v.txt");
        std::fs::write(&path, "2 3\nx 1 2 3\ny 1 2\n").unwrap();
        let err = Embeddings::load_vectors(&path).unwrap_err();
        assert!(matches!(err, Error::Parse { line: 3, .. }), "got {err:?}");
    }

    #[test]
    fn oversized_header_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("v.txt");

        std::fs::write(&path, "4294967296 4294967296\nx 1\n").unwrap();
        let err = Embeddings::load_vectors(&path).unwrap_err();
        assert!(matches!(err, Error::Parse { line: 1, .. }), "got {err:?}");

        // Fits in usize but far exceeds the rows present.
        std::fs::write(&path, "1000000000 1\nx 1\n").unwrap();
        let err = Embeddings::load_vectors(&path).unwrap_err();
        assert!(matches!(err, Error::Parse { line: 3, .. }), "got {err:?}");
    }

    #[test]
    fn extra_rows_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("v.txt");
        std::fs::write(&path, "1 1\nx 1\ny 2\n").unwrap();
        let err = Embeddings::load_vectors(&path).unwrap_err();
        assert!(matches!(err, Error::Parse { line: 3, .. }), "got {err:?}");
    }

    #[test]
    fn invalid_utf8_reports_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("v.txt");
        std::fs::write(&path, b"2 1\nx 1\n\xff\xfe 2\n").unwrap();
        let err = Embeddings::load_vectors(&path).unwrap_err();
        assert!(matches!(err, Error::Parse { line: 3, .. }), "got {err:?}");
    }

    #[test]
    fn crlf_lines_are_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("v.txt");
        std::fs::write(&path, "1 2\r\nx 1 2\r\n").unwrap();
        let e = Embeddings::load_vectors(&path).unwrap();
        assert_eq!(e.get("x").unwrap().to_vec(), vec![1.0, 2.0]);
    }
}
