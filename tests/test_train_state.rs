//! Training-state transitions observed through `DataManager`, including the
//! shared backend pin.

mod common;

use std::sync::Arc;

use agloader::data_loader::dataset::read_image;
use agloader::{
    Annotation, Backend, BackendSelection, DataError, DataManager, ImageSize, Sample, StateRequest,
    Task, TrainState, TransformUpdates,
};
use agloader::data_loader::transform::ScaleIntensity;
use common::{classification_dataset, isolated_options};

fn manager(dir: &tempfile::TempDir) -> DataManager {
    DataManager::from_layout(dir.path(), Task::ImageClassification, isolated_options()).unwrap()
}

#[test]
fn backend_conflict_leaves_state_unchanged() {
    let dir = classification_dataset(&[("a", 2)], 8);
    let mut dm = manager(&dir);

    dm.update_train_state(StateRequest::Train(Backend::TensorFlow)).unwrap();
    let err = dm.update_train_state(StateRequest::Train(Backend::Torch)).unwrap_err();
    assert!(matches!(
        err,
        DataError::BackendConflict { requested: Backend::Torch, pinned: Backend::TensorFlow }
    ));
    assert_eq!(dm.train_state(), TrainState::Train(Backend::TensorFlow));
}

#[test]
fn eval_then_none_keeps_the_pin() {
    let dir = classification_dataset(&[("a", 2)], 8);
    let mut dm = manager(&dir);

    dm.update_train_state(StateRequest::Train(Backend::TensorFlow)).unwrap();
    dm.update_train_state(StateRequest::Eval).unwrap();
    assert_eq!(dm.train_state(), TrainState::Eval(Some(Backend::TensorFlow)));
    assert_eq!(dm.train_state().to_string(), "eval-tf");

    dm.update_train_state(StateRequest::Default).unwrap();
    assert_eq!(dm.train_state(), TrainState::Default);

    dm.update_train_state(StateRequest::Train(Backend::TensorFlow)).unwrap();
    assert!(dm.update_train_state(StateRequest::Train(Backend::Torch)).is_err());
}

#[test]
fn pin_is_shared_between_managers() {
    let dir = classification_dataset(&[("a", 2)], 8);
    let selection = Arc::new(BackendSelection::new());
    let opts = isolated_options().with_backend_selection(Arc::clone(&selection));

    let mut first = DataManager::from_layout(dir.path(), Task::ImageClassification, opts.clone()).unwrap();
    let mut second = DataManager::from_layout(dir.path(), Task::ImageClassification, opts).unwrap();

    first.update_train_state(StateRequest::Train(Backend::Torch)).unwrap();
    assert!(second.update_train_state(StateRequest::Train(Backend::TensorFlow)).is_err());
    assert_eq!(second.train_state(), TrainState::Default);

    selection.unpin();
    second.update_train_state(StateRequest::Train(Backend::TensorFlow)).unwrap();
}

#[test]
fn plain_eval_allows_either_backend_later() {
    let dir = classification_dataset(&[("a", 2)], 8);
    let mut dm = manager(&dir);

    dm.update_train_state(StateRequest::Eval).unwrap();
    assert_eq!(dm.train_state(), TrainState::Eval(None));
    dm.update_train_state(StateRequest::Train(Backend::Torch)).unwrap();
    assert_eq!(dm.train_state().to_string(), "torch");
}

#[test]
fn disabled_returns_the_stored_sample_bit_for_bit() {
    let dir = classification_dataset(&[("a", 1)], 20);
    let mut dm = manager(&dir);
    dm.assign_resize(ImageSize::Fixed { height: 5, width: 5 });
    dm.push_transforms(TransformUpdates::new().transform(ScaleIntensity::new(3.0)));
    dm.update_train_state(StateRequest::Disabled).unwrap();

    let got = dm.get(0).unwrap().into_sample().unwrap();
    let raw = read_image(&dir.path().join("images/a/0.png")).unwrap();
    assert_eq!(got, Sample::new(raw, Annotation::Label(0)));
}

#[test]
fn eval_from_backend_keeps_conversion_but_skips_transforms() {
    let dir = classification_dataset(&[("a", 1)], 32);
    let mut dm = manager(&dir);
    dm.push_transforms(TransformUpdates::new().transform(ScaleIntensity::new(0.0)));
    dm.update_train_state(StateRequest::Train(Backend::Torch)).unwrap();
    dm.update_train_state(StateRequest::Eval).unwrap();

    let sample = dm.get(0).unwrap().into_sample().unwrap();
    assert_eq!(sample.image.shape(), &[3, 32, 32]);
    assert_eq!(sample.backend, Some(Backend::Torch));
}

#[test]
fn state_requests_parse_from_names() {
    for (name, expected) in [
        ("disabled", StateRequest::Disabled),
        ("none", StateRequest::Default),
        ("eval", StateRequest::Eval),
        ("tf", StateRequest::Train(Backend::TensorFlow)),
        ("torch", StateRequest::Train(Backend::Torch)),
    ] {
        assert_eq!(name.parse::<StateRequest>().unwrap(), expected);
    }
}
