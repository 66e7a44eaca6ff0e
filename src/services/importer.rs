//! Batch profile importer.
//!
//! Takes one heterogeneous batch of submissions and persists it in two
//! phases: guardian-capable people (staff, parents) first, students second.
//! The phase boundary exists because students may reference guardians from
//! the same batch by `temp_id`, and those references can only be resolved
//! once the guardian rows have database ids. Bio generation and roster
//! lookups run concurrently within a phase and always resolve to a fallback
//! value instead of failing the batch; store failures are fatal.

use std::collections::{HashMap, HashSet};

use futures::future::join_all;
use tracing::{error, info, instrument, warn};

use crate::domain::{NewPerson, PersonCategory, PersonDetails, Submission, SubmissionDetails};
use crate::services::bio::BioGenerator;
use crate::services::roster::{synthesize_roster_id, RosterLookup, RosterOutcome};
use crate::services::store::PeopleStore;

/// What to do with a student's guardian temp reference that matches no
/// guardian submission in the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DanglingRefPolicy {
    /// Exclude the reference, count it in the outcome, and keep going.
    Drop,
    /// Fail the whole batch before anything is persisted.
    Reject,
}

impl Default for DanglingRefPolicy {
    fn default() -> Self {
        Self::Drop
    }
}

impl DanglingRefPolicy {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "reject" => Self::Reject,
            _ => Self::Drop,
        }
    }
}

/// Errors surfaced by the batch importer.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// A student referenced a temp id that no guardian in the batch declared.
    /// Only raised under [`DanglingRefPolicy::Reject`].
    #[error("guardian temp_id `{temp_id}` does not match any guardian in the batch")]
    DanglingGuardianRef { temp_id: String },

    /// The store rejected an insert. Nothing from the batch survives: a
    /// student-phase failure removes the guardian rows again.
    #[error("batch could not be persisted: {detail}")]
    Persistence { detail: String },
}

/// Summary of a persisted batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOutcome {
    /// Ids of the guardian-capable rows, in submission order.
    pub created_guardian_ids: Vec<i64>,
    /// Ids of the student rows, in submission order.
    pub created_student_ids: Vec<i64>,
    /// Guardian temp references dropped under [`DanglingRefPolicy::Drop`].
    pub dropped_guardian_refs: usize,
}

impl ImportOutcome {
    pub fn created(&self) -> usize {
        self.created_guardian_ids.len() + self.created_student_ids.len()
    }
}

/// A guardian-capable submission after partitioning. `details` is always the
/// staff or parent variant, never a student.
struct GuardianCapable {
    temp_id: Option<String>,
    first_name: String,
    last_name: String,
    image: Option<String>,
    details: PersonDetails,
}

/// A student submission after partitioning, guardian references still
/// unresolved.
struct StudentSub {
    first_name: String,
    last_name: String,
    image: Option<String>,
    class_label: Option<String>,
    guardian_ids: Vec<i64>,
    guardian_temp_ids: Vec<String>,
}

/// Splits a batch into its two insert phases, preserving relative order
/// within each partition.
fn partition_batch(submissions: Vec<Submission>) -> (Vec<GuardianCapable>, Vec<StudentSub>) {
    let mut guardians = Vec::new();
    let mut students = Vec::new();

    for sub in submissions {
        let Submission {
            first_name,
            last_name,
            image,
            details,
        } = sub;

        match details {
            SubmissionDetails::Staff { temp_id, role } => guardians.push(GuardianCapable {
                temp_id,
                first_name,
                last_name,
                image,
                details: PersonDetails::Staff { role },
            }),
            SubmissionDetails::ParentGuardian { temp_id, role } => {
                guardians.push(GuardianCapable {
                    temp_id,
                    first_name,
                    last_name,
                    image,
                    details: PersonDetails::ParentGuardian { role },
                })
            }
            SubmissionDetails::Student {
                class_label,
                guardian_ids,
                guardian_temp_ids,
            } => students.push(StudentSub {
                first_name,
                last_name,
                image,
                class_label,
                guardian_ids,
                guardian_temp_ids,
            }),
        }
    }

    (guardians, students)
}

/// Order-preserving deduplicated union of a student's direct guardian ids
/// and the ids resolved from same-batch temp references. Direct ids come
/// first. Returns the resolved set plus any temp ids that matched nothing.
fn resolve_guardian_ids(
    direct_ids: &[i64],
    temp_ids: &[String],
    mapping: &HashMap<String, i64>,
) -> (Vec<i64>, Vec<String>) {
    let mut resolved = Vec::with_capacity(direct_ids.len() + temp_ids.len());
    let mut seen = HashSet::with_capacity(direct_ids.len() + temp_ids.len());
    let mut dangling = Vec::new();

    for id in direct_ids {
        if seen.insert(*id) {
            resolved.push(*id);
        }
    }
    for temp_id in temp_ids {
        match mapping.get(temp_id) {
            Some(id) => {
                if seen.insert(*id) {
                    resolved.push(*id);
                }
            }
            None => dangling.push(temp_id.clone()),
        }
    }

    (resolved, dangling)
}

/// Two-phase importer over pluggable collaborators.
pub struct BatchImporter<B, R, S> {
    bio: B,
    roster: R,
    store: S,
    policy: DanglingRefPolicy,
}

impl<B, R, S> BatchImporter<B, R, S>
where
    B: BioGenerator,
    R: RosterLookup,
    S: PeopleStore,
{
    pub fn new(bio: B, roster: R, store: S, policy: DanglingRefPolicy) -> Self {
        Self {
            bio,
            roster,
            store,
            policy,
        }
    }

    /// Persist one validated batch.
    ///
    /// The caller has already run the boundary validation; the importer does
    /// not re-check it and will persist a student with an empty guardian set
    /// if handed one.
    #[instrument(skip_all, fields(batch_size = submissions.len()))]
    pub async fn import(&self, submissions: Vec<Submission>) -> Result<ImportOutcome, ImportError> {
        let (guardians, students) = partition_batch(submissions);

        if self.policy == DanglingRefPolicy::Reject {
            let declared: HashSet<&str> = guardians
                .iter()
                .filter_map(|g| g.temp_id.as_deref())
                .collect();
            for student in &students {
                for temp_id in &student.guardian_temp_ids {
                    if !declared.contains(temp_id.as_str()) {
                        return Err(ImportError::DanglingGuardianRef {
                            temp_id: temp_id.clone(),
                        });
                    }
                }
            }
        }

        // Phase 1: guardian-capable rows. Temp ids are collected up front
        // because enrichment consumes the partition.
        let temp_ids: Vec<Option<String>> = guardians.iter().map(|g| g.temp_id.clone()).collect();
        let guardian_rows = self.enrich_guardians(guardians).await;
        let created_guardian_ids = self
            .store
            .insert_people(&guardian_rows)
            .await
            .map_err(|e| ImportError::Persistence {
                detail: e.to_string(),
            })?;

        if created_guardian_ids.len() != guardian_rows.len() {
            let detail = format!(
                "store returned {} ids for {} rows",
                created_guardian_ids.len(),
                guardian_rows.len()
            );
            self.compensate(&created_guardian_ids).await;
            return Err(ImportError::Persistence { detail });
        }

        let mut temp_map: HashMap<String, i64> = HashMap::new();
        for (temp_id, id) in temp_ids.into_iter().zip(&created_guardian_ids) {
            if let Some(temp_id) = temp_id {
                temp_map.insert(temp_id, *id);
            }
        }

        // Phase 2: students, now that same-batch guardians have real ids.
        let mut dropped_guardian_refs = 0;
        let resolved: Vec<(StudentSub, Vec<i64>)> = students
            .into_iter()
            .map(|student| {
                let (ids, dangling) = resolve_guardian_ids(
                    &student.guardian_ids,
                    &student.guardian_temp_ids,
                    &temp_map,
                );
                for temp_id in &dangling {
                    warn!(temp_id = %temp_id, "dropping unresolvable guardian temp_id");
                }
                dropped_guardian_refs += dangling.len();
                (student, ids)
            })
            .collect();

        let student_rows = self.enrich_students(resolved).await;
        let created_student_ids = match self.store.insert_people(&student_rows).await {
            Ok(ids) => ids,
            Err(e) => {
                let detail = e.to_string();
                self.compensate(&created_guardian_ids).await;
                return Err(ImportError::Persistence { detail });
            }
        };

        info!(
            guardians = created_guardian_ids.len(),
            students = created_student_ids.len(),
            dropped_refs = dropped_guardian_refs,
            "batch import persisted"
        );

        Ok(ImportOutcome {
            created_guardian_ids,
            created_student_ids,
            dropped_guardian_refs,
        })
    }

    async fn enrich_guardians(&self, guardians: Vec<GuardianCapable>) -> Vec<NewPerson> {
        join_all(guardians.into_iter().map(|g| {
            let bio = &self.bio;
            async move {
                let text = bio
                    .generate(
                        &g.first_name,
                        &g.last_name,
                        g.details.category(),
                        g.details.role(),
                    )
                    .await
                    .into_text();
                NewPerson {
                    first_name: g.first_name,
                    last_name: g.last_name,
                    image: g.image,
                    details: g.details,
                    bio: text,
                    // The roster only tracks students; everyone else gets a
                    // synthesized id.
                    external_roster_id: synthesize_roster_id(),
                }
            }
        }))
        .await
    }

    async fn enrich_students(&self, students: Vec<(StudentSub, Vec<i64>)>) -> Vec<NewPerson> {
        join_all(students.into_iter().map(|(s, guardian_ids)| {
            let bio = &self.bio;
            let roster = &self.roster;
            async move {
                let external_roster_id = match roster.lookup(&s.first_name, &s.last_name).await {
                    RosterOutcome::Found(id) => id,
                    RosterOutcome::NotFound | RosterOutcome::Degraded => synthesize_roster_id(),
                };
                let text = bio
                    .generate(
                        &s.first_name,
                        &s.last_name,
                        PersonCategory::Student,
                        s.class_label.as_deref(),
                    )
                    .await
                    .into_text();
                NewPerson {
                    first_name: s.first_name,
                    last_name: s.last_name,
                    image: s.image,
                    details: PersonDetails::Student {
                        class_label: s.class_label,
                        guardian_ids,
                    },
                    bio: text,
                    external_roster_id,
                }
            }
        }))
        .await
    }

    /// Undo phase-1 inserts after a later failure. A failed compensation
    /// leaves orphaned guardian rows behind; log their ids so the damage is
    /// recoverable by hand.
    async fn compensate(&self, guardian_ids: &[i64]) {
        if guardian_ids.is_empty() {
            return;
        }
        match self.store.delete_people(guardian_ids).await {
            Ok(()) => warn!(
                count = guardian_ids.len(),
                "rolled back guardian rows after batch failure"
            ),
            Err(e) => error!(
                ids = ?guardian_ids,
                error = %e,
                "failed to roll back guardian rows; they remain orphaned"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(super) fn staff(first: &str, temp_id: Option<&str>) -> Submission {
        Submission {
            first_name: first.to_string(),
            last_name: "Example".to_string(),
            image: None,
            details: SubmissionDetails::Staff {
                temp_id: temp_id.map(|s| s.to_string()),
                role: None,
            },
        }
    }

    pub(super) fn parent(first: &str, temp_id: &str) -> Submission {
        Submission {
            first_name: first.to_string(),
            last_name: "Example".to_string(),
            image: None,
            details: SubmissionDetails::ParentGuardian {
                temp_id: Some(temp_id.to_string()),
                role: None,
            },
        }
    }

    pub(super) fn student(first: &str, guardian_temp_ids: &[&str]) -> Submission {
        Submission {
            first_name: first.to_string(),
            last_name: "Example".to_string(),
            image: None,
            details: SubmissionDetails::Student {
                class_label: None,
                guardian_ids: vec![],
                guardian_temp_ids: guardian_temp_ids.iter().map(|s| s.to_string()).collect(),
            },
        }
    }

    #[test]
    fn partition_preserves_relative_order() {
        let batch = vec![
            staff("Ada", Some("a")),
            student("Leo", &["a"]),
            staff("Bram", None),
            student("Mia", &["a"]),
        ];

        let (guardians, students) = partition_batch(batch);
        let guardian_names: Vec<_> = guardians.iter().map(|g| g.first_name.as_str()).collect();
        let student_names: Vec<_> = students.iter().map(|s| s.first_name.as_str()).collect();

        assert_eq!(guardian_names, vec!["Ada", "Bram"]);
        assert_eq!(student_names, vec!["Leo", "Mia"]);
    }

    #[test]
    fn resolution_unions_direct_and_mapped_ids() {
        let mapping: HashMap<String, i64> =
            [("a".to_string(), 10), ("b".to_string(), 11)].into_iter().collect();

        let (resolved, dangling) = resolve_guardian_ids(
            &[11, 5, 5],
            &["a".to_string(), "b".to_string(), "a".to_string()],
            &mapping,
        );

        // Direct ids keep their position; mapped ids follow; duplicates
        // collapse onto the first occurrence.
        assert_eq!(resolved, vec![11, 5, 10]);
        assert!(dangling.is_empty());
    }

    #[test]
    fn unmapped_temp_ids_are_reported() {
        let mapping: HashMap<String, i64> = [("a".to_string(), 1)].into_iter().collect();

        let (resolved, dangling) =
            resolve_guardian_ids(&[], &["a".to_string(), "ghost".to_string()], &mapping);

        assert_eq!(resolved, vec![1]);
        assert_eq!(dangling, vec!["ghost".to_string()]);
    }

    #[test]
    fn policy_parsing_defaults_to_drop() {
        assert_eq!(DanglingRefPolicy::from_str("reject"), DanglingRefPolicy::Reject);
        assert_eq!(DanglingRefPolicy::from_str("REJECT"), DanglingRefPolicy::Reject);
        assert_eq!(DanglingRefPolicy::from_str("drop"), DanglingRefPolicy::Drop);
        assert_eq!(DanglingRefPolicy::from_str("anything"), DanglingRefPolicy::Drop);
        assert_eq!(DanglingRefPolicy::default(), DanglingRefPolicy::Drop);
    }
}

#[cfg(test)]
mod import_flow {
    use super::tests::{parent, staff, student};
    use super::*;
    use crate::services::bio::{BioOutcome, FALLBACK_BIO};
    use crate::services::roster::SYNTHESIZED_ID_PREFIX;
    use crate::services::store::StoreError;
    use assert_matches::assert_matches;
    use std::sync::{Arc, Mutex};

    /// Deterministic bio source. `fail: true` simulates an unreachable
    /// service, which the client maps to [`BioOutcome::Fallback`].
    struct FakeBio {
        fail: bool,
    }

    impl BioGenerator for FakeBio {
        async fn generate(
            &self,
            first_name: &str,
            _last_name: &str,
            _category: PersonCategory,
            _label: Option<&str>,
        ) -> BioOutcome {
            if self.fail {
                BioOutcome::Fallback
            } else {
                BioOutcome::Generated(format!("{first_name} enjoys quiet mornings."))
            }
        }
    }

    /// Roster that knows exactly the names it was built with.
    struct FakeRoster {
        known: Vec<(String, String, String)>,
    }

    impl FakeRoster {
        fn empty() -> Self {
            Self { known: vec![] }
        }

        fn with(entries: &[(&str, &str, &str)]) -> Self {
            Self {
                known: entries
                    .iter()
                    .map(|(f, l, id)| (f.to_string(), l.to_string(), id.to_string()))
                    .collect(),
            }
        }
    }

    impl RosterLookup for FakeRoster {
        async fn lookup(&self, first_name: &str, last_name: &str) -> RosterOutcome {
            self.known
                .iter()
                .find(|(f, l, _)| f == first_name && l == last_name)
                .map(|(_, _, id)| RosterOutcome::Found(id.clone()))
                .unwrap_or(RosterOutcome::NotFound)
        }
    }

    /// In-memory store that hands out sequential ids and records every call.
    /// Cloning shares the underlying state, so tests keep a handle for
    /// inspection after the import.
    #[derive(Clone)]
    struct FakeStore {
        inner: Arc<StoreState>,
    }

    struct StoreState {
        rows: Mutex<Vec<NewPerson>>,
        deleted: Mutex<Vec<i64>>,
        insert_calls: Mutex<usize>,
        fail_on_insert_call: Option<usize>,
    }

    impl FakeStore {
        fn new() -> Self {
            Self::failing_on_insert_call(None)
        }

        fn failing_on_insert_call(call: Option<usize>) -> Self {
            Self {
                inner: Arc::new(StoreState {
                    rows: Mutex::new(vec![]),
                    deleted: Mutex::new(vec![]),
                    insert_calls: Mutex::new(0),
                    fail_on_insert_call: call,
                }),
            }
        }

        fn rows(&self) -> Vec<NewPerson> {
            self.inner.rows.lock().unwrap().clone()
        }

        fn deleted(&self) -> Vec<i64> {
            self.inner.deleted.lock().unwrap().clone()
        }
    }

    impl PeopleStore for FakeStore {
        async fn insert_people(&self, rows: &[NewPerson]) -> Result<Vec<i64>, StoreError> {
            if rows.is_empty() {
                return Ok(vec![]);
            }

            let call = {
                let mut calls = self.inner.insert_calls.lock().unwrap();
                *calls += 1;
                *calls
            };
            if self.inner.fail_on_insert_call == Some(call) {
                return Err(StoreError("constraint violated".to_string()));
            }

            let mut stored = self.inner.rows.lock().unwrap();
            let first_id = stored.len() as i64 + 1;
            stored.extend_from_slice(rows);
            Ok((first_id..first_id + rows.len() as i64).collect())
        }

        async fn delete_people(&self, ids: &[i64]) -> Result<(), StoreError> {
            self.inner.deleted.lock().unwrap().extend_from_slice(ids);
            Ok(())
        }
    }

    fn importer(
        roster: FakeRoster,
        store: &FakeStore,
        policy: DanglingRefPolicy,
    ) -> BatchImporter<FakeBio, FakeRoster, FakeStore> {
        BatchImporter::new(FakeBio { fail: false }, roster, store.clone(), policy)
    }

    fn synthesized(id: &str) -> bool {
        id.strip_prefix(SYNTHESIZED_ID_PREFIX)
            .is_some_and(|digits| digits.len() == 5 && digits.chars().all(|c| c.is_ascii_digit()))
    }

    #[tokio::test]
    async fn guardian_only_batch_creates_rows_in_order() {
        let store = FakeStore::new();
        let importer = importer(FakeRoster::empty(), &store, DanglingRefPolicy::Drop);

        let outcome = importer
            .import(vec![staff("Ada", Some("a")), parent("Priya", "g-1")])
            .await
            .unwrap();

        assert_eq!(outcome.created_guardian_ids, vec![1, 2]);
        assert!(outcome.created_student_ids.is_empty());
        assert_eq!(outcome.dropped_guardian_refs, 0);

        let rows = store.rows();
        assert_eq!(rows[0].first_name, "Ada");
        assert_eq!(rows[1].first_name, "Priya");
        assert_eq!(rows[0].bio, "Ada enjoys quiet mornings.");
        // Non-students never hit the roster.
        assert!(rows.iter().all(|r| synthesized(&r.external_roster_id)));
    }

    #[tokio::test]
    async fn same_batch_guardian_references_resolve_to_real_ids() {
        let store = FakeStore::new();
        let importer = importer(FakeRoster::empty(), &store, DanglingRefPolicy::Drop);

        let outcome = importer
            .import(vec![
                parent("Marcus", "g-1"),
                parent("Olivia", "g-2"),
                student("Leo", &["g-1", "g-2"]),
            ])
            .await
            .unwrap();

        assert_eq!(outcome.created_guardian_ids, vec![1, 2]);
        assert_eq!(outcome.created_student_ids, vec![3]);

        let rows = store.rows();
        assert_eq!(
            rows[2].details,
            PersonDetails::Student {
                class_label: None,
                guardian_ids: vec![1, 2],
            }
        );
    }

    #[tokio::test]
    async fn bio_failures_fall_back_to_fixed_sentence() {
        let store = FakeStore::new();
        let importer = BatchImporter::new(
            FakeBio { fail: true },
            FakeRoster::empty(),
            store.clone(),
            DanglingRefPolicy::Drop,
        );

        importer
            .import(vec![parent("Marcus", "g-1"), student("Leo", &["g-1"])])
            .await
            .unwrap();

        assert!(store.rows().iter().all(|r| r.bio == FALLBACK_BIO));
    }

    #[tokio::test]
    async fn roster_misses_synthesize_student_ids() {
        let store = FakeStore::new();
        let roster = FakeRoster::with(&[("Leo", "Example", "R-1987")]);
        let importer = importer(roster, &store, DanglingRefPolicy::Drop);

        importer
            .import(vec![
                parent("Marcus", "g-1"),
                student("Leo", &["g-1"]),
                student("Mia", &["g-1"]),
            ])
            .await
            .unwrap();

        let rows = store.rows();
        assert_eq!(rows[1].external_roster_id, "R-1987");
        assert!(synthesized(&rows[2].external_roster_id));
    }

    #[tokio::test]
    async fn dangling_reference_is_dropped_and_counted() {
        let store = FakeStore::new();
        let importer = importer(FakeRoster::empty(), &store, DanglingRefPolicy::Drop);

        let outcome = importer
            .import(vec![parent("Marcus", "g-1"), student("Leo", &["g-1", "ghost"])])
            .await
            .unwrap();

        assert_eq!(outcome.dropped_guardian_refs, 1);
        assert_eq!(store.rows()[1].details.guardian_ids(), &[1]);
    }

    #[tokio::test]
    async fn reject_policy_persists_nothing() {
        let store = FakeStore::new();
        let importer = importer(FakeRoster::empty(), &store, DanglingRefPolicy::Reject);

        let result = importer
            .import(vec![parent("Marcus", "g-1"), student("Leo", &["g-1", "ghost"])])
            .await;

        assert_matches!(
            result,
            Err(ImportError::DanglingGuardianRef { temp_id }) if temp_id == "ghost"
        );
        assert!(store.rows().is_empty());
    }

    #[tokio::test]
    async fn student_phase_failure_rolls_back_guardian_rows() {
        let store = FakeStore::failing_on_insert_call(Some(2));
        let importer = importer(FakeRoster::empty(), &store, DanglingRefPolicy::Drop);

        let result = importer
            .import(vec![parent("Marcus", "g-1"), student("Leo", &["g-1"])])
            .await;

        assert_matches!(result, Err(ImportError::Persistence { .. }));
        assert_eq!(store.deleted(), vec![1]);
    }

    #[tokio::test]
    async fn staff_role_is_stored_verbatim_with_no_guardians() {
        let store = FakeStore::new();
        let importer = importer(FakeRoster::empty(), &store, DanglingRefPolicy::Drop);

        importer
            .import(vec![Submission {
                first_name: "Dana".to_string(),
                last_name: "Reyes".to_string(),
                image: None,
                details: SubmissionDetails::Staff {
                    temp_id: None,
                    role: Some("  Head of Science  ".to_string()),
                },
            }])
            .await
            .unwrap();

        let rows = store.rows();
        assert_eq!(
            rows[0].details,
            PersonDetails::Staff {
                role: Some("  Head of Science  ".to_string()),
            }
        );
        assert!(rows[0].details.guardian_ids().is_empty());
    }

    #[tokio::test]
    async fn resubmitting_a_batch_duplicates_people() {
        let store = FakeStore::new();
        let importer = importer(FakeRoster::empty(), &store, DanglingRefPolicy::Drop);
        let batch = || vec![parent("Marcus", "g-1"), student("Leo", &["g-1"])];

        let first = importer.import(batch()).await.unwrap();
        let second = importer.import(batch()).await.unwrap();

        assert_eq!(first.created(), 2);
        assert_eq!(second.created_guardian_ids, vec![3]);
        assert_eq!(second.created_student_ids, vec![4]);
        // The second Leo points at the second Marcus.
        assert_eq!(store.rows()[3].details.guardian_ids(), &[3]);
    }
}
