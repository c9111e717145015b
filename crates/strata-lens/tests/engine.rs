mod common;

use std::collections::{BTreeSet, HashSet};

use common::{food_and_vehicles, ConceptEmbedder, ProbeEmbedder, TestRepo, DEVICES};
use strata_core::StrataError;
use strata_lens::{Engine, EngineState};

fn paths(engine: &Engine) -> Vec<&str> {
    engine.get_results().iter().map(|r| r.path()).collect()
}

#[test]
fn results_stay_empty_until_fetched() {
    let repo = TestRepo::new();
    repo.add_file_change_commit(
        "file1.md",
        "Markdown is a lightweight markup language\n\nIt uses plain text formatting\n",
        "Add markdown notes",
    );
    let mut engine = repo.engine(ProbeEmbedder::new());
    assert!(engine.get_results().is_empty());

    engine.analyze_codebase().unwrap();
    engine.query("lightweight markup language");
    assert!(engine.get_results().is_empty());
    assert_eq!(engine.state(), EngineState::QueryPending);
}

#[tokio::test]
async fn gets_data_using_vector_embeddings() {
    let repo = TestRepo::new();
    repo.add_file_change_commit(
        "file1.md",
        "Markdown is a lightweight markup language\n\nIt uses plain text formatting\n",
        "Add markdown notes",
    );
    repo.add_file_change_commit(
        "file2.txt",
        "motorbike, ford, mercedes\n",
        "Add vehicle information",
    );
    let mut engine = repo.engine(ProbeEmbedder::new());
    engine.analyze_codebase().unwrap();

    let query = "lightweight markup language";
    engine.query(query);
    engine.fetch().await.unwrap();

    let results = engine.get_results();
    assert_eq!(results[0].path(), "file1.md");
    let unique: HashSet<&str> = results.iter().map(|r| r.path()).collect();
    assert_eq!(unique.len(), results.len());
    assert!(results[0].lines(query).await.unwrap().contains(&1));
}

#[test]
fn allows_fetching_data_synchronously() {
    let repo = food_and_vehicles();
    let mut engine = repo.engine(ProbeEmbedder::new());
    engine.analyze_codebase().unwrap();
    engine.query("tomato pizza");
    engine.fetch_sync().unwrap();

    assert_eq!(paths(&engine), vec!["articles.txt", "vehicles.txt"]);
    assert!(engine.get_results()[0].score() > engine.get_results()[1].score());
}

#[tokio::test]
async fn fetch_and_fetch_sync_agree() {
    let repo = food_and_vehicles();
    let mut engine = repo.engine(ProbeEmbedder::new());
    engine.analyze_codebase().unwrap();

    engine.query("pomodoro spaghetti");
    engine.fetch().await.unwrap();
    let fetched: Vec<(String, f64)> = engine
        .get_results()
        .iter()
        .map(|r| (r.path().to_string(), r.score()))
        .collect();

    engine.query("pomodoro spaghetti");
    engine.fetch_sync().unwrap();
    let synced: Vec<(String, f64)> = engine
        .get_results()
        .iter()
        .map(|r| (r.path().to_string(), r.score()))
        .collect();

    assert_eq!(fetched, synced);
}

#[tokio::test]
async fn considers_filename_in_results() {
    let repo = TestRepo::new();
    repo.add_file_change_commit("recipes.txt", "motorbike, ford, mercedes\n", ".");
    repo.add_file_change_commit("vehicles.txt", "Ford", "Add vehicle information");
    repo.add_file_change_commit(
        "vehicles.txt",
        "motorbike, ford, mercedes\n",
        "Add vehicle information",
    );
    let mut engine = repo.engine(ProbeEmbedder::new());
    engine.analyze_codebase().unwrap();
    engine.query("tomato pizza");
    engine.fetch().await.unwrap();

    assert_eq!(engine.get_results()[0].path(), "recipes.txt");
}

#[tokio::test]
async fn considers_commit_messages() {
    let repo = TestRepo::new();
    repo.add_file_change_commit("vehicles_1.txt", "the the the", "pizza tomato salami recipe");
    repo.add_file_change_commit("vehicles_2.txt", ".", "Add vehicle information");
    repo.add_file_change_commit("vehicles_2.txt", "", "Add vehicle information");
    let mut engine = repo.engine(ProbeEmbedder::new());
    engine.analyze_codebase().unwrap();
    engine.query("italian pomodoro pie with slices of cured meat");
    engine.fetch().await.unwrap();

    assert_eq!(engine.get_results()[0].path(), "vehicles_1.txt");
}

#[tokio::test]
async fn truncates_very_long_lines() {
    let repo = TestRepo::new();
    repo.add_file_change_commit(
        "articles.txt",
        &format!(
            "car {} pizza recipe tomato italian pie\n",
            "the a about ".repeat(40)
        ),
        "Add italian food recipes",
    );
    repo.add_file_change_commit("vehicles.txt", "Ford tomato", "Add vehicle information");
    repo.add_file_change_commit(
        "vehicles.txt",
        "motorbike, ford, mercedes with tomato and cheese\n",
        "Add vehicle information",
    );
    let mut engine = repo.engine(ProbeEmbedder::new());
    let first = engine.analyze_codebase().unwrap();
    engine.query("tomato pizza");
    engine.fetch().await.unwrap();

    assert_eq!(engine.get_results()[0].path(), "vehicles.txt");

    // Truncation is deterministic, so a second pass finds every chunk.
    let second = engine.analyze_codebase().unwrap();
    assert_eq!(second.embedded, 0);
    assert_eq!(second.reused, first.chunks);
}

#[tokio::test]
async fn includes_all_matching_lines() {
    let repo = TestRepo::new();
    repo.add_file_change_commit("devices.txt", DEVICES, "Add italian food recipes");
    let mut engine = repo.engine(ProbeEmbedder::new());
    engine.analyze_codebase().unwrap();

    let query = "smartphone";
    engine.query(query);
    engine.fetch().await.unwrap();

    let result = &engine.get_results()[0];
    assert_eq!(result.path(), "devices.txt");
    assert_eq!(
        result.get_lines(query).unwrap(),
        BTreeSet::from([1, 2, 4, 6, 7, 8, 9])
    );
}

#[tokio::test]
async fn exact_matches_have_higher_score() {
    let repo = TestRepo::new();
    repo.add_file_change_commit("devices.txt", DEVICES, "Add italian food recipes");
    let mut engine = repo.engine(ProbeEmbedder::new());
    engine.analyze_codebase().unwrap();

    let query = "apple iphone 12";
    engine.query(query);
    engine.fetch().await.unwrap();

    let result = &engine.get_results()[0];
    assert_eq!(result.path(), "devices.txt");
    assert_eq!(result.get_lines(query).unwrap(), BTreeSet::from([7]));
}

#[test]
fn matched_lines_are_real_non_blank_lines() {
    let repo = TestRepo::new();
    repo.add_file_change_commit("devices.txt", DEVICES, "Add devices");
    repo.add_file_change_commit(
        "articles.txt",
        "\nItalian food recipes\n\n   \npizza with tomato\n",
        "Add italian food recipes",
    );
    let mut engine = repo.engine(ProbeEmbedder::new());
    engine.analyze_codebase().unwrap();

    for query in ["smartphone", "tomato pizza", "apple iphone 12"] {
        engine.query(query);
        engine.fetch_sync().unwrap();
        for result in engine.get_results() {
            let lines: Vec<&str> = result.content().lines().collect();
            for number in result.get_lines(query).unwrap() {
                assert!(number >= 1 && number <= lines.len(), "{number} out of range");
                assert!(!lines[number - 1].trim().is_empty(), "line {number} is blank");
            }
        }
    }
}

#[tokio::test]
async fn chunks_are_persisted_between_runs() {
    let repo = food_and_vehicles();

    let first = ProbeEmbedder::new();
    {
        let mut engine = repo.engine(first.clone());
        let report = engine.analyze_codebase().unwrap();
        assert!(first.documents() > 2);
        assert_eq!(report.embedded, report.chunks);

        engine.query("pomodoro spaghetti");
        engine.fetch().await.unwrap();
        assert_eq!(engine.get_results()[0].path(), "articles.txt");
    }

    let second = ProbeEmbedder::new();
    let mut engine = repo.engine(second.clone());
    let report = engine.analyze_codebase().unwrap();
    assert_eq!(second.documents(), 0);
    assert_eq!(report.embedded, 0);
    assert!(report.reused > 2);

    engine.query("pomodoro spaghetti");
    engine.fetch().await.unwrap();
    assert_eq!(engine.get_results()[0].path(), "articles.txt");
}

#[test]
fn changed_content_only_embeds_new_chunks() {
    let repo = food_and_vehicles();
    let probe = ProbeEmbedder::new();
    let mut engine = repo.engine(probe.clone());
    engine.analyze_codebase().unwrap();

    repo.add_file_change_commit("vehicles.txt", "motorbike, ford, audi\n", "Swap mercedes for audi");
    let before = probe.documents();
    let report = engine.analyze_codebase().unwrap();

    // New content chunk plus the new commit message.
    assert_eq!(report.embedded, 2);
    assert_eq!(probe.documents() - before, 2);
}

#[test]
fn rewritten_files_rank_on_their_current_content() {
    let repo = TestRepo::new();
    repo.add_file_change_commit("a.txt", "tomato pizza\n", "Add a");
    repo.add_file_change_commit("b.txt", "motorbike\n", "Add b");
    let mut engine = repo.engine(ProbeEmbedder::new());
    engine.analyze_codebase().unwrap();

    repo.add_file_change_commit("a.txt", "motorbike ford\n", "Rewrite a");
    repo.add_file_change_commit("b.txt", "pizza with tomato\n", "Rewrite b");
    engine.analyze_codebase().unwrap();

    let query = "tomato pizza";
    engine.query(query);
    engine.fetch_sync().unwrap();
    let results = engine.get_results();
    assert_eq!(results[0].path(), "b.txt");
    assert_eq!(results[0].content(), "pizza with tomato\n");
    assert_eq!(results[0].get_lines(query).unwrap(), BTreeSet::from([1]));
    if let Some(a) = results.iter().find(|r| r.path() == "a.txt") {
        assert!(a.score() < 1.0, "a.txt scored {} on replaced content", a.score());
    }
}

#[test]
fn renamed_files_leave_nothing_at_the_old_path() {
    let repo = TestRepo::new();
    repo.add_file_change_commit(
        "old.txt",
        "tomato pizza recipe with basil and cheese\n",
        "Add recipe",
    );
    repo.rename_commit("old.txt", "new.txt", "Move recipe");
    let mut engine = repo.engine(ProbeEmbedder::new());
    engine.analyze_codebase().unwrap();

    engine.query("tomato pizza");
    engine.fetch_sync().unwrap();
    let results = engine.get_results();
    assert_eq!(results[0].path(), "new.txt");
    if let Some(old) = results.iter().find(|r| r.path() == "old.txt") {
        assert!(old.content().is_empty());
        assert!(old.score() < results[0].score());
    }
}

#[test]
fn empty_content_is_not_an_error() {
    let repo = TestRepo::new();
    repo.add_file_change_commit("empty.txt", "", "Add empty file");
    let mut engine = repo.engine(ProbeEmbedder::new());

    let report = engine.analyze_codebase().unwrap();
    assert_eq!(report.files, 1);
    assert_eq!(report.chunks, 1);
    assert!(report.is_complete());
}

#[test]
fn empty_repository_indexes_nothing() {
    let repo = TestRepo::new();
    let mut engine = repo.engine(ProbeEmbedder::new());
    let report = engine.analyze_codebase().unwrap();
    assert_eq!(report.chunks, 0);

    engine.query("anything");
    engine.fetch_sync().unwrap();
    assert!(engine.get_results().is_empty());
}

#[test]
fn embedding_failures_are_collected() {
    let repo = TestRepo::new();
    repo.add_file_change_commit("good.txt", "tomato pizza\n", "Add good");
    repo.add_file_change_commit("bad.txt", "poison apple\n", "Add bad");
    let probe = ProbeEmbedder::failing_on("poison");
    let mut engine = repo.engine(probe.clone());

    let report = engine.analyze_codebase().unwrap();
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].path, "bad.txt");
    assert_eq!(report.embedded, report.chunks - 1);
    assert_eq!(engine.state(), EngineState::Indexed);

    engine.query("tomato pizza");
    engine.fetch_sync().unwrap();
    assert_eq!(engine.get_results()[0].path(), "good.txt");

    // Stored chunks stay stored; only the failed one is attempted again.
    let again = engine.analyze_codebase().unwrap();
    assert_eq!(again.embedded, 0);
    assert_eq!(again.failures.len(), 1);
}

#[test]
fn corrupted_store_is_fatal() {
    let repo = TestRepo::new();
    repo.add_file_change_commit("a.txt", "alpha\n", "Add a");
    let index_dir = repo.path().join(".strata");
    std::fs::create_dir_all(&index_dir).unwrap();
    std::fs::write(index_dir.join("index.db"), vec![0x42u8; 8192]).unwrap();

    let err = Engine::open_with(
        repo.path(),
        strata_core::StrataConfig::default(),
        std::sync::Arc::new(ConceptEmbedder),
    )
    .unwrap_err();
    assert!(matches!(err, StrataError::Database(_)), "{err}");
}

#[test]
fn query_before_analyze_is_empty() {
    let repo = food_and_vehicles();
    let mut engine = repo.engine(ProbeEmbedder::new());
    engine.query("tomato pizza");
    engine.fetch_sync().unwrap();
    assert!(engine.get_results().is_empty());
}

#[test]
fn last_query_wins() {
    let repo = food_and_vehicles();
    let mut engine = repo.engine(ProbeEmbedder::new());
    engine.analyze_codebase().unwrap();

    engine.query("tomato pizza");
    engine.query("motorbike");
    engine.fetch_sync().unwrap();
    assert_eq!(engine.get_results()[0].path(), "vehicles.txt");
}
