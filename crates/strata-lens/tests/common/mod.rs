#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use git2::{Repository, Signature};
use strata_core::{StrataConfig, StrataError};
use strata_lens::embedding::Embedder;
use strata_lens::scoring::tokenize;
use strata_lens::Engine;
use tempfile::TempDir;

const FOOD: usize = 0;
const VEHICLE: usize = 1;
const PHONE: usize = 2;
const PRODUCE: usize = 3;
const MARKUP: usize = 4;
const CONCEPTS: usize = 8;
const RESIDUAL_BUCKETS: usize = 1024;

/// A tiny deterministic "semantic" embedder: known words load onto a few
/// concept axes, unknown words land in hashed residual buckets, and
/// numbers are ignored.
#[derive(Debug, Default)]
pub struct ConceptEmbedder;

impl ConceptEmbedder {
    fn concept(word: &str) -> Option<&'static [(usize, f32)]> {
        let weights: &'static [(usize, f32)] = match word {
            "tomato" | "pizza" | "pomodoro" | "spaghetti" | "italian" | "recipe" | "recipes"
            | "salami" | "pie" | "meat" | "cured" | "food" | "cheese" | "potatoes" | "fried"
            | "chicken" => &[(FOOD, 1.0)],
            "pepperoni" => &[(FOOD, 1.0), (PRODUCE, 0.6)],
            "motorbike" | "ford" | "mercedes" | "vehicle" | "vehicles" | "car" => {
                &[(VEHICLE, 1.0)]
            }
            "mango" => &[(FOOD, 0.6), (PRODUCE, 0.8)],
            "juice" => &[(FOOD, 0.7), (PRODUCE, 0.7)],
            "wings" => &[(PRODUCE, 1.0)],
            "slices" => &[(FOOD, 0.3), (PRODUCE, 1.0)],
            "nothing" => &[(PHONE, 0.5), (PRODUCE, 0.8)],
            "smartphone" => &[(PHONE, 1.0), (PRODUCE, 0.5)],
            "iphone" | "android" => &[(PHONE, 1.0)],
            "pixel" => &[(PHONE, 0.8), (PRODUCE, 0.4)],
            "galaxy" => &[(PHONE, 0.8)],
            "samsung" => &[(PHONE, 0.6), (PRODUCE, 0.6)],
            "google" => &[(PHONE, 0.4), (PRODUCE, 0.4)],
            "apple" => &[(PHONE, 0.5), (FOOD, 0.5)],
            "markup" | "markdown" => &[(MARKUP, 1.0)],
            "lightweight" | "language" => &[(MARKUP, 0.5)],
            _ => return None,
        };
        Some(weights)
    }

    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; CONCEPTS + RESIDUAL_BUCKETS];
        for word in tokenize(text) {
            if word.chars().all(|c| c.is_ascii_digit()) {
                continue;
            }
            match Self::concept(&word) {
                Some(weights) => {
                    for (axis, weight) in weights {
                        vector[*axis] += weight;
                    }
                }
                None => {
                    let bucket = (fnv1a(word.as_bytes()) % RESIDUAL_BUCKETS as u64) as usize;
                    vector[CONCEPTS + bucket] += 1.0;
                }
            }
        }
        vector
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

#[async_trait]
impl Embedder for ConceptEmbedder {
    fn model(&self) -> &str {
        "concepts"
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, StrataError> {
        Ok(texts.iter().map(|text| self.embed(text)).collect())
    }
}

/// Wraps [`ConceptEmbedder`], counting documents and refusing any text
/// that contains `poison`.
#[derive(Debug, Default)]
pub struct ProbeEmbedder {
    inner: ConceptEmbedder,
    documents: AtomicUsize,
    poison: Option<String>,
}

impl ProbeEmbedder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_on(poison: &str) -> Arc<Self> {
        Arc::new(Self {
            poison: Some(poison.to_string()),
            ..Self::default()
        })
    }

    /// Documents embedded so far (queries included).
    pub fn documents(&self) -> usize {
        self.documents.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for ProbeEmbedder {
    fn model(&self) -> &str {
        "probe"
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, StrataError> {
        if let Some(poison) = &self.poison {
            if texts.iter().any(|t| t.contains(poison.as_str())) {
                return Err(StrataError::Embedding(format!("cannot embed '{poison}'")));
            }
        }
        self.documents.fetch_add(texts.len(), Ordering::SeqCst);
        self.inner.embed_documents(texts).await
    }
}

/// A throwaway git repository.
pub struct TestRepo {
    dir: TempDir,
    repo: Repository,
}

impl TestRepo {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        Self { dir, repo }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `contents` to `file_name` and commit it as John Doe.
    pub fn add_file_change_commit(&self, file_name: &str, contents: &str, message: &str) {
        std::fs::write(self.path().join(file_name), contents).unwrap();
        let mut index = self.repo.index().unwrap();
        index.add_path(Path::new(file_name)).unwrap();
        index.write().unwrap();
        self.commit_index(message);
    }

    /// Move `from` to `to` and commit the rename.
    pub fn rename_commit(&self, from: &str, to: &str, message: &str) {
        std::fs::rename(self.path().join(from), self.path().join(to)).unwrap();
        let mut index = self.repo.index().unwrap();
        index.remove_path(Path::new(from)).unwrap();
        index.add_path(Path::new(to)).unwrap();
        index.write().unwrap();
        self.commit_index(message);
    }

    fn commit_index(&self, message: &str) {
        let mut index = self.repo.index().unwrap();
        let tree = self.repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = Signature::now("John Doe", "john@example.com").unwrap();
        let parent = self.repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        self.repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .unwrap();
    }

    /// An engine on this repository with the default configuration and
    /// provider.
    pub fn default_engine(&self) -> Engine {
        Engine::open(self.path()).unwrap()
    }

    /// An engine on this repository using `embedder` and default settings.
    pub fn engine(&self, embedder: Arc<dyn Embedder>) -> Engine {
        Engine::open_with(self.path(), StrataConfig::default(), embedder).unwrap()
    }
}

/// Two-file fixture shared by several ranking tests.
pub fn food_and_vehicles() -> TestRepo {
    let repo = TestRepo::new();
    repo.add_file_change_commit(
        "articles.txt",
        "Italian food recipes, spaghetti, pomodoro, pepperoni\n",
        "Add italian food recipes",
    );
    repo.add_file_change_commit("vehicles.txt", "Ford", "Add vehicle information");
    repo.add_file_change_commit(
        "vehicles.txt",
        "motorbike, ford, mercedes\n",
        "Add vehicle information",
    );
    repo
}

pub const DEVICES: &str = "1: Nothing
        2: Google Pixel 2 Android
        3:
        4: Mango juice
        5: Fried potatoes
        6: Chicken wings
        7: Apple iPhone 12
        8: Pizza slices with pepperoni
        9: Samsung Galaxy S10
        10:
        11:
        12:
        13:
        14:
        ";
