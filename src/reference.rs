use crate::fingerprint::utils::FromVec;
use crate::fingerprint::{Feature, HashMethod, ImageHash, FEATURE_LANES_SIZE};
use crate::Errors;
use anyhow::{Context, Result};
use log::{info, warn};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

/// Reference building from directories of catalog images
pub mod builder;

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Catalog id of a reference key.
///
/// Keys that are image paths (`cards\\xy1-1.png`, `cards/xy1-1.jpg`) are reduced to the file
/// stem, any other key is the catalog id itself.
///
pub fn catalog_id_from_key(key: &str) -> String {
    let name = key.rsplit(['/', '\\']).next().unwrap_or(key);
    match name.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && IMAGE_EXTENSIONS
                    .iter()
                    .any(|e| e.eq_ignore_ascii_case(ext)) =>
        {
            stem.to_string()
        }
        _ => key.to_string(),
    }
}

pub(crate) fn is_reference_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.iter().any(|x| x.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

fn read_json_object(path: &Path) -> Result<Map<String, Value>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Unable to read reference file {}", path.display()))?;
    match serde_json::from_str::<Value>(&text)
        .with_context(|| format!("Unable to parse reference file {}", path.display()))?
    {
        Value::Object(map) => Ok(map),
        _ => Err(Errors::ReferenceFormat(
            path.display().to_string(),
            "top level value must be an object".into(),
        )
        .into()),
    }
}

fn write_json_object(path: &Path, map: Map<String, Value>) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Unable to create reference file {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &Value::Object(map))
        .with_context(|| format!("Unable to write reference file {}", path.display()))?;
    Ok(())
}

/// Embedding reference: catalog id to vector, kept in insertion order.
///
/// All vectors share one dimension, fixed by the first inserted vector.
///
#[derive(Debug, Clone, Default)]
pub struct EmbeddingIndex {
    dim: usize,
    entries: Vec<(String, Feature)>,
    positions: HashMap<String, usize>,
}

impl EmbeddingIndex {
    /// Adds a reference vector. A known catalog id gets the new vector at its old position.
    ///
    pub fn insert(&mut self, catalog_id: impl Into<String>, vector: Vec<f32>) -> Result<()> {
        if vector.is_empty() {
            return Err(Errors::EmptyFeature.into());
        }
        if self.entries.is_empty() {
            self.dim = vector.len();
        } else if vector.len() != self.dim {
            return Err(Errors::DimensionMismatch(vector.len(), self.dim).into());
        }
        let catalog_id = catalog_id.into();
        let feature = Feature::from_vec(vector);
        match self.positions.get(&catalog_id) {
            Some(pos) => self.entries[*pos].1 = feature,
            None => {
                self.positions.insert(catalog_id.clone(), self.entries.len());
                self.entries.push((catalog_id, feature));
            }
        }
        Ok(())
    }

    pub fn from_pairs<I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, Vec<f32>)>,
    {
        let mut index = Self::default();
        for (id, v) in pairs {
            index.insert(id, v)?;
        }
        Ok(index)
    }

    /// Vector length (`0` for an empty reference)
    ///
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of SIMD lanes every stored feature occupies
    ///
    pub fn lanes(&self) -> usize {
        self.dim.div_ceil(FEATURE_LANES_SIZE)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(String, Feature)] {
        &self.entries
    }

    pub fn get(&self, catalog_id: &str) -> Option<&Feature> {
        self.positions.get(catalog_id).map(|p| &self.entries[*p].1)
    }

    /// Loads a JSON object `{key: [f32, ...]}`. Keys are normalized with
    /// [`catalog_id_from_key`].
    ///
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut index = Self::default();
        for (key, value) in read_json_object(path)? {
            let vector: Vec<f32> = serde_json::from_value(value).map_err(|e| {
                Errors::ReferenceFormat(path.display().to_string(), format!("{}: {}", key, e))
            })?;
            index
                .insert(catalog_id_from_key(&key), vector)
                .with_context(|| format!("Bad reference vector `{}` in {}", key, path.display()))?;
        }
        info!(
            "Loaded {} reference embeddings of dimension {} from {}",
            index.len(),
            index.dim(),
            path.display()
        );
        Ok(index)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut map = Map::with_capacity(self.entries.len());
        for (id, feature) in &self.entries {
            let mut v = Vec::<f32>::from_vec(feature);
            v.truncate(self.dim);
            map.insert(id.clone(), Value::from(v));
        }
        write_json_object(path.as_ref(), map)
    }
}

#[derive(Debug, Clone, Default)]
struct HashTable {
    entries: Vec<(ImageHash, String)>,
    positions: HashMap<ImageHash, usize>,
}

/// Hash reference: for every method an ordered table of hash code to catalog id.
///
/// Every code in the reference has the same number of bits. A code inserted twice keeps its
/// first position and takes the later catalog id.
///
#[derive(Debug, Clone)]
pub struct HashIndex {
    bits: usize,
    tables: BTreeMap<HashMethod, HashTable>,
}

impl HashIndex {
    pub fn new(bits: usize) -> Self {
        Self {
            bits,
            tables: BTreeMap::new(),
        }
    }

    /// Name of the file holding the table of `method`
    ///
    pub fn file_name(method: HashMethod) -> String {
        format!("image_hashes_{}.json", method.name())
    }

    pub fn bits(&self) -> usize {
        self.bits
    }

    pub fn insert(
        &mut self,
        method: HashMethod,
        code: ImageHash,
        catalog_id: impl Into<String>,
    ) -> Result<()> {
        if code.len() != self.bits {
            return Err(Errors::HashSizeMismatch(code.len(), self.bits).into());
        }
        let table = self.tables.entry(method).or_default();
        let catalog_id = catalog_id.into();
        match table.positions.get(&code) {
            Some(pos) => table.entries[*pos].1 = catalog_id,
            None => {
                table.positions.insert(code.clone(), table.entries.len());
                table.entries.push((code, catalog_id));
            }
        }
        Ok(())
    }

    /// Table of `method` in insertion order, empty if the method has no entries
    ///
    pub fn table(&self, method: HashMethod) -> &[(ImageHash, String)] {
        self.tables
            .get(&method)
            .map(|t| t.entries.as_slice())
            .unwrap_or(&[])
    }

    pub fn len(&self, method: HashMethod) -> usize {
        self.table(method).len()
    }

    pub fn is_empty(&self) -> bool {
        HashMethod::ALL.iter().all(|m| self.table(*m).is_empty())
    }

    /// Loads the tables `image_hashes_<method>.json` from `dir`. Every file is a JSON object
    /// mapping the hex code to the catalog id. A missing file leaves its method empty.
    ///
    pub fn load_dir(dir: impl AsRef<Path>, bits: usize) -> Result<Self> {
        let dir = dir.as_ref();
        let mut index = Self::new(bits);
        for method in HashMethod::ALL {
            let path = dir.join(Self::file_name(method));
            if !path.exists() {
                warn!(
                    "Reference table {} is missing, {} will not take part in matching",
                    path.display(),
                    method
                );
                continue;
            }
            index.load_table(method, &path)?;
        }
        info!(
            "Loaded hash reference from {}: {}",
            dir.display(),
            HashMethod::ALL
                .iter()
                .map(|m| format!("{}={}", m, index.len(*m)))
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(index)
    }

    fn load_table(&mut self, method: HashMethod, path: &Path) -> Result<()> {
        for (hex, value) in read_json_object(path)? {
            let code = ImageHash::from_hex(&hex, self.bits)
                .with_context(|| format!("Bad hash code in {}", path.display()))?;
            let id = match value {
                Value::String(id) => id,
                other => {
                    return Err(Errors::ReferenceFormat(
                        path.display().to_string(),
                        format!("catalog id of {} must be a string, got {}", hex, other),
                    )
                    .into())
                }
            };
            self.insert(method, code, id)?;
        }
        Ok(())
    }

    /// Writes one table file per method with entries into `dir`
    ///
    pub fn save_dir(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Unable to create directory {}", dir.display()))?;
        for (method, table) in &self.tables {
            let map = table
                .entries
                .iter()
                .map(|(code, id)| (code.to_hex(), Value::String(id.clone())))
                .collect::<Map<_, _>>();
            write_json_object(&dir.join(Self::file_name(*method)), map)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::fingerprint::utils::FromVec;
    use crate::fingerprint::HashMethod;
    use crate::reference::{catalog_id_from_key, EmbeddingIndex, HashIndex};
    use crate::test_stuff::{random_hash, random_vector};
    use anyhow::Result;
    use std::fs;

    #[test]
    fn catalog_keys() {
        assert_eq!(catalog_id_from_key("cards\\xy1-1.png"), "xy1-1");
        assert_eq!(catalog_id_from_key("db/images/sm2-14.JPG"), "sm2-14");
        assert_eq!(catalog_id_from_key("xy1-1.jpeg"), "xy1-1");
        assert_eq!(catalog_id_from_key("swsh4-25"), "swsh4-25");
        assert_eq!(catalog_id_from_key("base1-4.v2"), "base1-4.v2");
    }

    #[test]
    fn embedding_dimensions_checked() -> Result<()> {
        let mut index = EmbeddingIndex::default();
        index.insert("a", random_vector(10, 1))?;
        assert_eq!(index.dim(), 10);
        assert_eq!(index.lanes(), 2);
        assert!(index.insert("b", random_vector(11, 2)).is_err());
        assert!(index.insert("c", vec![]).is_err());
        Ok(())
    }

    #[test]
    fn embedding_reinsert_keeps_position() -> Result<()> {
        let mut index = EmbeddingIndex::default();
        index.insert("a", vec![1.0, 0.0])?;
        index.insert("b", vec![0.0, 1.0])?;
        index.insert("a", vec![0.5, 0.5])?;
        let ids = index.entries().iter().map(|(id, _)| id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(index.len(), 2);
        Ok(())
    }

    #[test]
    fn embedding_file_keeps_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("embeddings.json");
        fs::write(
            &path,
            r#"{"cards\\zz9-9.png": [0.0, 1.0, 2.0], "aa1-1": [3.0, 4.0, 5.0]}"#,
        )?;
        let index = EmbeddingIndex::load(&path)?;
        let ids = index.entries().iter().map(|(id, _)| id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["zz9-9", "aa1-1"]);

        let copy = dir.path().join("copy.json");
        index.save(&copy)?;
        let reloaded = EmbeddingIndex::load(&copy)?;
        assert_eq!(reloaded.dim(), 3);
        for (l, r) in reloaded.entries().iter().zip(index.entries()) {
            assert_eq!(l.0, r.0);
            assert_eq!(Vec::<f32>::from_vec(&l.1), Vec::<f32>::from_vec(&r.1));
        }
        assert_eq!(
            Vec::<f32>::from_vec(reloaded.get("aa1-1").unwrap())[..3],
            [3.0, 4.0, 5.0]
        );
        Ok(())
    }

    #[test]
    fn embedding_file_format_errors() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("bad.json");
        fs::write(&path, r#"{"a": "not a vector"}"#)?;
        assert!(EmbeddingIndex::load(&path).is_err());
        fs::write(&path, r#"[1, 2, 3]"#)?;
        assert!(EmbeddingIndex::load(&path).is_err());
        assert!(EmbeddingIndex::load(dir.path().join("missing.json")).is_err());
        Ok(())
    }

    #[test]
    fn duplicate_code_overwrites_id() -> Result<()> {
        let mut index = HashIndex::new(64);
        let (c1, c2) = (random_hash(64, 1), random_hash(64, 2));
        index.insert(HashMethod::Average, c1.clone(), "first")?;
        index.insert(HashMethod::Average, c2.clone(), "second")?;
        index.insert(HashMethod::Average, c1.clone(), "third")?;
        assert_eq!(
            index.table(HashMethod::Average),
            &[(c1, "third".to_string()), (c2, "second".to_string())]
        );
        assert!(index
            .insert(HashMethod::Average, random_hash(16, 3), "x")
            .is_err());
        Ok(())
    }

    #[test]
    fn hash_tables_on_disk() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut index = HashIndex::new(64);
        for (i, m) in [HashMethod::Average, HashMethod::Perceptual].iter().enumerate() {
            index.insert(*m, random_hash(64, i as u64), format!("card{}", i))?;
            index.insert(*m, random_hash(64, 10 + i as u64), "other")?;
        }
        index.save_dir(dir.path())?;
        assert!(dir.path().join("image_hashes_average_hash.json").exists());
        assert!(dir.path().join("image_hashes_phash.json").exists());
        assert!(!dir.path().join("image_hashes_dhash.json").exists());

        let loaded = HashIndex::load_dir(dir.path(), 64)?;
        for m in HashMethod::ALL {
            assert_eq!(loaded.table(m), index.table(m));
        }
        assert_eq!(loaded.len(HashMethod::Difference), 0);
        assert!(!loaded.is_empty());
        Ok(())
    }

    #[test]
    fn hash_file_format_errors() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(HashIndex::file_name(HashMethod::Difference));
        fs::write(&path, r#"{"ffffffffffffffff": 7}"#)?;
        assert!(HashIndex::load_dir(dir.path(), 64).is_err());
        fs::write(&path, r#"{"fff": "x"}"#)?;
        assert!(HashIndex::load_dir(dir.path(), 64).is_err());
        fs::write(&path, r#"{"ffffffffffffffff": "x"}"#)?;
        assert_eq!(HashIndex::load_dir(dir.path(), 64)?.len(HashMethod::Difference), 1);
        Ok(())
    }
}
