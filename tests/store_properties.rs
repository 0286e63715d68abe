use rollbook::export::group_rows;
use rollbook::validate::{normalize_subject, Score};
use rollbook::{Store, StoreConfig, StoreError, Topper};

fn memory_store() -> Store {
    Store::open(&StoreConfig::in_memory()).expect("open in-memory store")
}

fn grade_rows(store: &Store, roll: &str) -> usize {
    store
        .export_all()
        .expect("export")
        .into_iter()
        .filter(|r| r.roll_number == roll && r.subject.is_some())
        .count()
}

#[test]
fn added_student_reads_back_with_no_grades() {
    let store = memory_store();
    for (name, roll) in [("Alice", "R1"), ("  Bob   Builder ", " R2 "), ("Zoë", "r-003")] {
        store.add_student(name, roll).expect("add student");
        let got = store
            .get_student(roll)
            .expect("get student")
            .expect("student present");
        assert_eq!(got.name, name.split_whitespace().collect::<Vec<_>>().join(" "));
        assert_eq!(got.roll_number, roll.trim());
        assert!(got.grades.is_empty());
    }
}

#[test]
fn duplicate_roll_is_rejected_and_storage_unchanged() {
    let store = memory_store();
    store.add_student("Alice", "R1").expect("add");
    store
        .add_grade("R1", "Math", Score::new(70).expect("score"))
        .expect("grade");

    let err = store.add_student("Impostor", "R1").expect_err("duplicate");
    assert!(matches!(err, StoreError::DuplicateKey(_)), "{err:?}");

    let students = store.list_students().expect("list");
    assert_eq!(students.len(), 1);
    assert_eq!(students[0].name, "Alice");
    let alice = store.get_student("R1").expect("get").expect("present");
    assert_eq!(alice.grades.get("Math"), Some(&70));
}

#[test]
fn add_grade_twice_overwrites_single_row() {
    let store = memory_store();
    store.add_student("Alice", "R1").expect("add");
    store.add_grade_raw("R1", "math", "60").expect("first grade");
    store.add_grade_raw("R1", "  MATH ", "95").expect("second grade");

    assert_eq!(grade_rows(&store, "R1"), 1);
    let alice = store.get_student("R1").expect("get").expect("present");
    assert_eq!(alice.grades.len(), 1);
    assert_eq!(alice.grades.get("Math"), Some(&95));
}

#[test]
fn add_grade_for_unknown_student_is_not_found() {
    let store = memory_store();
    let err = store
        .add_grade_raw("GHOST", "Math", "50")
        .expect_err("missing student");
    assert!(matches!(err, StoreError::NotFound(_)), "{err:?}");
    assert!(store.export_all().expect("export").is_empty());
}

#[test]
fn validation_runs_before_existence_check() {
    let store = memory_store();
    // Student is missing, but the bad grade is reported first.
    let err = store
        .add_grade_raw("GHOST", "Math", "150")
        .expect_err("out of range");
    assert!(matches!(err, StoreError::InvalidInput(_)), "{err:?}");

    let err = store.add_grade_raw("GHOST", "   ", "50").expect_err("blank subject");
    assert!(matches!(err, StoreError::InvalidInput(_)), "{err:?}");
}

#[test]
fn student_average_of_grades_and_of_nothing() {
    let store = memory_store();
    store.add_student("Alice", "R1").expect("add");
    store.add_student("Bob", "R2").expect("add");
    store.add_grade_raw("R1", "Math", "80").expect("grade");
    store.add_grade_raw("R1", "Science", "90").expect("grade");

    assert_eq!(store.student_average("R1").expect("avg"), 85.0);
    assert_eq!(store.student_average("R2").expect("avg"), 0.0);
}

#[test]
fn averages_are_rounded_to_two_decimals() {
    let store = memory_store();
    store.add_student("Alice", "R1").expect("add");
    for (subject, grade) in [("Math", "70"), ("Art", "70"), ("Music", "71")] {
        store.add_grade_raw("R1", subject, grade).expect("grade");
    }
    // 211 / 3 = 70.333...
    assert_eq!(store.student_average("R1").expect("avg"), 70.33);
}

#[test]
fn class_average_ignores_subject_case_and_spacing() {
    let store = memory_store();
    store.add_student("Alice", "R1").expect("add");
    store.add_student("Bob", "R2").expect("add");
    store.add_grade_raw("R1", "science", "70").expect("grade");
    store.add_grade_raw("R2", "SCIENCE", "75").expect("grade");

    let lower = store.class_average("science").expect("avg");
    let title = store.class_average("Science").expect("avg");
    let spaced = store.class_average("  sCiEnCe ").expect("avg");
    assert_eq!(lower, 72.5);
    assert_eq!(lower, title);
    assert_eq!(lower, spaced);
    assert_eq!(store.class_average("History").expect("avg"), 0.0);
}

#[test]
fn canonical_and_raw_subjects_hit_the_same_key() {
    let store = memory_store();
    store.add_student("Alice", "R1").expect("add");
    store.add_grade_raw("R1", "ßtudies", "80").expect("grade");

    let canonical = normalize_subject("ßtudies").expect("subject");
    assert_eq!(store.class_average("ßtudies").expect("avg"), 80.0);
    assert_eq!(store.class_average(canonical.as_str()).expect("avg"), 80.0);
    assert_eq!(store.subject_average(&canonical).expect("avg"), 80.0);
    let topper = store.topper_of(&canonical).expect("topper").expect("present");
    assert_eq!(topper.roll_number, "R1");

    let record = store.get_student("R1").expect("get").expect("present");
    assert_eq!(record.grades.get(canonical.as_str()), Some(&80));
}

#[test]
fn topper_ties_go_to_first_name_alphabetically() {
    let store = memory_store();
    store.add_student("Zed", "R1").expect("add");
    store.add_student("Amy", "R2").expect("add");
    store.add_student("Max", "R3").expect("add");
    store.add_grade_raw("R1", "Math", "88").expect("grade");
    store.add_grade_raw("R2", "Math", "88").expect("grade");
    store.add_grade_raw("R3", "Math", "60").expect("grade");

    let top = store.subject_topper("math").expect("topper").expect("some");
    assert_eq!(
        top,
        Topper {
            roll_number: "R2".into(),
            name: "Amy".into(),
            grade: 88
        }
    );
    assert_eq!(store.subject_topper("Physics").expect("topper"), None);
}

#[test]
fn delete_cascades_to_grades() {
    let store = memory_store();
    store.add_student("Alice", "R1").expect("add");
    store.add_student("Bob", "R2").expect("add");
    store.add_grade_raw("R1", "Math", "70").expect("grade");
    store.add_grade_raw("R1", "Art", "65").expect("grade");
    store.add_grade_raw("R2", "Math", "90").expect("grade");

    store.delete_student("R1").expect("delete");

    assert_eq!(store.get_student("R1").expect("get"), None);
    assert_eq!(grade_rows(&store, "R1"), 0);
    assert_eq!(store.class_average("Math").expect("avg"), 90.0);
    assert_eq!(store.class_average("Art").expect("avg"), 0.0);
    // Re-adding the roll starts from a clean slate.
    store.add_student("Alice Again", "R1").expect("re-add");
    let again = store.get_student("R1").expect("get").expect("present");
    assert!(again.grades.is_empty());
}

#[test]
fn delete_of_missing_student_is_not_found() {
    let store = memory_store();
    let err = store.delete_student("NOPE").expect_err("missing");
    assert!(matches!(err, StoreError::NotFound(_)), "{err:?}");
}

#[test]
fn class_scenario_average_and_topper() {
    let store = memory_store();
    store.add_student("Alice", "R1").expect("add");
    store.add_student("Bob", "R2").expect("add");
    store.add_grade_raw("R1", "math", "70").expect("grade");
    store.add_grade_raw("R2", "math", "90").expect("grade");

    assert_eq!(store.class_average("Math").expect("avg"), 80.0);
    assert_eq!(
        store.subject_topper("Math").expect("topper"),
        Some(Topper {
            roll_number: "R2".into(),
            name: "Bob".into(),
            grade: 90
        })
    );
}

#[test]
fn list_is_ordered_by_roll_and_search_is_case_insensitive() {
    let store = memory_store();
    store.add_student("Charlie", "R3").expect("add");
    store.add_student("alice", "R1").expect("add");
    store.add_student("Bob", "R2").expect("add");

    let rolls: Vec<String> = store
        .list_students()
        .expect("list")
        .into_iter()
        .map(|s| s.roll_number)
        .collect();
    assert_eq!(rolls, vec!["R1", "R2", "R3"]);

    let hits = store.search_students("ALI").expect("search");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].roll_number, "R1");
    assert_eq!(store.search_students("r2").expect("search")[0].name, "Bob");
    assert_eq!(store.search_students("  ").expect("search").len(), 3);
    assert_eq!(store.student_count().expect("count"), 3);
}

#[test]
fn export_rows_rebuild_every_student() {
    let store = memory_store();
    store.add_student("Alice", "R1").expect("add");
    store.add_student("Bob", "R2").expect("add");
    store.add_student("Cleo", "R3").expect("add");
    store.add_grade_raw("R1", "Math", "70").expect("grade");
    store.add_grade_raw("R1", "Art", "55").expect("grade");
    store.add_grade_raw("R3", "Math", "100").expect("grade");

    let rows = store.export_all().expect("export");
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0].subject.as_deref(), Some("Art"));
    assert_eq!(rows[1].subject.as_deref(), Some("Math"));
    assert_eq!(rows[2].roll_number, "R2");
    assert_eq!(rows[2].subject, None);
    assert_eq!(rows[2].grade, None);

    let rebuilt = group_rows(&rows);
    let listed = store.list_students().expect("list");
    assert_eq!(rebuilt.len(), listed.len());
    for record in rebuilt {
        let direct = store
            .get_student(&record.roll_number)
            .expect("get")
            .expect("present");
        assert_eq!(record, direct);
    }
}

#[test]
fn data_survives_reopening_the_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("students.db");
    {
        let store = Store::open(&StoreConfig::sqlite(&path)).expect("open");
        store.add_student("Alice", "R1").expect("add");
        store.add_grade_raw("R1", "Math", "81").expect("grade");
    }
    let store = Store::open(&StoreConfig::sqlite(&path)).expect("reopen");
    let alice = store.get_student("R1").expect("get").expect("present");
    assert_eq!(alice.grades.get("Math"), Some(&81));
    assert_eq!(store.backend_kind(), "sqlite");
}

#[cfg(not(feature = "postgres"))]
#[test]
fn postgres_without_feature_is_a_storage_error() {
    let err = Store::open(&StoreConfig::postgres("postgres://localhost/none")).expect_err("no pg");
    assert!(matches!(err, StoreError::Storage(_)), "{err:?}");
}
