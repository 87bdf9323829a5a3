use std::sync::Arc;

use mathink_engine::stub::{StubBlock, StubEngine, StubResponse};
use mathink_engine::{
    Category, EngineSession, Language, LanguageOptions, Mode, Recognizer, RecognizerConfig, Status,
};

fn engine() -> Arc<StubEngine> {
    Arc::new(StubEngine::new().accept_license("k.key"))
}

#[test]
fn full_lifecycle_releases_every_handle() {
    let engine = engine();
    engine.push_response(StubResponse::lines(vec![vec![
        StubBlock::new([0], ["x", "\\times"]),
        StubBlock::new([1], ["2"]),
    ]]));

    {
        let session = EngineSession::open(engine.clone(), "k.key").unwrap();
        let mut settings = session.create_settings().unwrap();
        settings
            .add_language((Language::MiddleExpansion, LanguageOptions::EX))
            .unwrap();
        settings.set_mode(Mode::MultiChar).unwrap();
        settings.commit(&session).unwrap();

        let mut ink = session.create_ink().unwrap();
        ink.add_stroke([(0, 0), (5, 5)]).unwrap();
        ink.add_stroke([(10, 10), (15, 15)]).unwrap();

        let recognition = session.recognize(&ink, &settings).unwrap();
        let blocks: Vec<_> = recognition.result.blocks().collect();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].stroke_indices, vec![0]);
        assert_eq!(blocks[1].stroke_indices, vec![1]);
        assert_eq!(recognition.result.best(), Some("x"));
    }

    assert_eq!(engine.live_handles(), 0);
    assert_eq!(engine.double_releases(), 0);
    assert!(!engine.is_open());
}

#[test]
fn objects_do_not_survive_their_session() {
    let engine = engine();
    let mut session = EngineSession::open(engine.clone(), "k.key").unwrap();
    let mut settings = session.create_settings().unwrap();
    settings.add_language(Language::Chemical).unwrap();
    settings.commit(&session).unwrap();

    let mut ink = session.create_ink().unwrap();
    ink.add_stroke([(1, 1), (2, 2)]).unwrap();

    session.close().unwrap();
    assert_eq!(engine.live_handles(), 0);
    assert_eq!(engine.late_releases(), 0);
    session.create("k.key").unwrap();

    let err = session.recognize(&ink, &settings).unwrap_err();
    assert_eq!(err.status_code(), Some(Status::InvalidInstance));
    assert_eq!(
        settings.commit(&session).unwrap_err().status_code(),
        Some(Status::InvalidInstance)
    );

    let mut settings = session.create_settings().unwrap();
    settings.add_language(Language::Chemical).unwrap();
    settings.commit(&session).unwrap();
    let mut ink = session.create_ink().unwrap();
    ink.add_stroke([(1, 1), (2, 2)]).unwrap();

    let recognition = session.recognize(&ink, &settings).unwrap();
    assert_eq!(recognition.status, Status::NoResult);
    drop(session);
    assert_eq!(engine.live_handles(), 0);
    assert_eq!(engine.late_releases(), 0);
    assert_eq!(engine.double_releases(), 0);
}

#[test]
fn recognizer_reports_stub_dry_run() {
    let config = RecognizerConfig {
        license: "k.key".into(),
        resource_dir: None,
        ..RecognizerConfig::default()
    };
    let recognizer = Recognizer::open(engine(), &config).unwrap();

    let err = recognizer.recognize().unwrap_err();
    assert_eq!(err.status_code().map(Status::category), Some(Category::Caller));

    recognizer.add_point(3, 4).unwrap();
    recognizer.end_stroke().unwrap();
    let recognition = recognizer.recognize().unwrap();
    assert!(recognition.result.is_empty());
    assert_eq!(recognition.status.category(), Category::Empty);
}

#[test]
fn recognition_serializes_to_json() {
    let engine = engine();
    engine.push_response(StubResponse::lines(vec![vec![StubBlock::new([0, 1], ["\\frac{1}{2}"])]]));
    let config = RecognizerConfig {
        license: "k.key".into(),
        resource_dir: None,
        ..RecognizerConfig::default()
    };
    let recognizer = Recognizer::open(engine, &config).unwrap();
    for x in [0, 10] {
        recognizer.add_point(x, 0).unwrap();
        recognizer.end_stroke().unwrap();
    }

    let json = serde_json::to_value(recognizer.recognize().unwrap()).unwrap();
    assert_eq!(json["status"], "Success");
    assert_eq!(json["result"]["lines"][0]["blocks"][0]["candidates"][0], "\\frac{1}{2}");
    assert_eq!(json["result"]["lines"][0]["blocks"][0]["stroke_indices"], serde_json::json!([0, 1]));
}
