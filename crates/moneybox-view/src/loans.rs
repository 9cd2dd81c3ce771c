//! Loan requests: submission with attachments, decisions, and the live
//! per-member feed.
//!
//! A loan carries two independent [`Decision`] flags. `status` is set by an
//! administrator; `userDecision` is the member's answer and may only be
//! recorded once `status` has left pending. Each flag moves at most once.

use std::sync::Arc;

use moneybox_core::{
  collection::{Collection, CollectionQuery, Direction, Fields, StoredDocument},
  document::{Document, FileUpload, UploadOutcome},
  loan::{Decision, LoanRequest, NewLoanRequest},
  store::{DocumentStore, ObjectStorage, SubscriptionError},
  timestamp,
};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::watch;

use crate::{Error, Result, coordinator::Coordinator, uploads};

// ─── Submission ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionReport {
  pub loan_id:  String,
  pub outcomes: Vec<UploadOutcome>,
  pub message:  String,
}

impl SubmissionReport {
  fn new(loan_id: String, outcomes: Vec<UploadOutcome>) -> Self {
    let uploaded = outcomes.iter().filter(|o| !o.is_failed()).count();
    let message = if uploaded == outcomes.len() {
      "Loan request submitted successfully with all documents!".to_owned()
    } else if uploaded == 0 {
      "Loan request submitted, but none of the documents could be uploaded.".to_owned()
    } else {
      format!("Loan request submitted with {uploaded} file(s). Some files failed to upload.")
    };
    Self { loan_id, outcomes, message }
  }

  pub fn uploaded(&self) -> impl Iterator<Item = &Document> {
    self.outcomes.iter().filter_map(UploadOutcome::document)
  }

  pub fn failed_count(&self) -> usize { self.outcomes.iter().filter(|o| o.is_failed()).count() }
}

/// Write-side operations on the `loans` collection.
pub struct LoanDesk<S, O> {
  store:   Arc<S>,
  storage: Arc<O>,
}

impl<S, O> Clone for LoanDesk<S, O> {
  fn clone(&self) -> Self { Self { store: self.store.clone(), storage: self.storage.clone() } }
}

impl<S: DocumentStore, O: ObjectStorage> LoanDesk<S, O> {
  pub fn new(store: Arc<S>, storage: Arc<O>) -> Self { Self { store, storage } }

  pub async fn submit(
    &self,
    user_id: &str,
    request: NewLoanRequest,
    files: Vec<FileUpload>,
  ) -> Result<SubmissionReport> {
    self.submit_with_progress(user_id, request, files, |_| {}).await
  }

  /// Validate the form, create the loan, upload its attachments, and attach
  /// whatever uploaded successfully. Nothing is written if validation fails.
  pub async fn submit_with_progress<P: FnMut(u8) + Send>(
    &self,
    user_id: &str,
    request: NewLoanRequest,
    files: Vec<FileUpload>,
    progress: P,
  ) -> Result<SubmissionReport> {
    request.validate(files.len())?;

    let loan_id = self
      .store
      .add(Collection::Loans, request.into_fields(user_id))
      .await
      .map_err(Error::store)?;
    tracing::info!(%loan_id, user_id, files = files.len(), "loan request created");

    let outcomes = uploads::upload_batch(&*self.storage, &files, user_id, &loan_id, progress).await;

    let documents: Vec<&Document> = outcomes.iter().filter_map(UploadOutcome::document).collect();
    if !documents.is_empty() {
      let mut partial = Fields::new();
      partial.insert("documents".into(), json!(documents));
      self
        .store
        .update(Collection::Loans, loan_id.clone(), partial)
        .await
        .map_err(Error::store)?;
    }

    let report = SubmissionReport::new(loan_id, outcomes);
    if report.failed_count() > 0 {
      tracing::warn!(
        loan_id = %report.loan_id,
        failed = report.failed_count(),
        "some attachments failed"
      );
    }
    Ok(report)
  }

  // ─── Decisions ─────────────────────────────────────────────────────────────

  /// The member's answer to an administrator's ruling.
  pub async fn record_decision(
    &self,
    loan_id: &str,
    user_id: &str,
    decision: Decision,
  ) -> Result<LoanRequest> {
    let (doc, loan) = self.load_document(loan_id).await?;
    if loan.user_id != user_id {
      return Err(Error::NotOwner(loan_id.to_owned()));
    }
    if loan.status.is_pending() {
      return Err(Error::AwaitingStatus(loan_id.to_owned()));
    }
    let next = loan.user_decision.transition(decision)?;

    let mut partial = Fields::new();
    partial.insert("userDecision".into(), json!(next));
    partial.insert("userDecisionAt".into(), timestamp::server_timestamp());
    self.write_transition(&doc, "userDecision", partial, |l| l.user_decision, next).await?;

    tracing::info!(loan_id, user_id, decision = %next, "member decision recorded");
    self.load(loan_id).await
  }

  /// The administrator's ruling.
  pub async fn set_status(&self, loan_id: &str, status: Decision) -> Result<LoanRequest> {
    let (doc, loan) = self.load_document(loan_id).await?;
    let next = loan.status.transition(status)?;

    let mut partial = Fields::new();
    partial.insert("status".into(), json!(next));
    self.write_transition(&doc, "status", partial, |l| l.status, next).await?;

    tracing::info!(loan_id, status = %next, "loan status set");
    self.load(loan_id).await
  }

  /// One-shot read of a member's loans, newest first.
  pub async fn loans_for(&self, user_id: &str) -> Result<Vec<LoanRequest>> {
    let docs = self.store.query(feed_query(user_id)).await.map_err(Error::store)?;
    let mut loans = docs.iter().map(LoanRequest::from_document).collect::<Result<Vec<_>, _>>()?;
    sort_newest_first(&mut loans);
    Ok(loans)
  }

  async fn load(&self, loan_id: &str) -> Result<LoanRequest> {
    Ok(self.load_document(loan_id).await?.1)
  }

  async fn load_document(&self, loan_id: &str) -> Result<(StoredDocument, LoanRequest)> {
    let doc = self
      .store
      .get(Collection::Loans, loan_id.to_owned())
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::LoanNotFound(loan_id.to_owned()))?;
    let loan = LoanRequest::from_document(&doc)?;
    Ok((doc, loan))
  }

  /// Write `partial` only while `field` still holds the value read in `doc`.
  /// Losing the race to a concurrent decision is an illegal transition from
  /// whatever that decision was.
  async fn write_transition(
    &self,
    doc: &StoredDocument,
    field: &str,
    partial: Fields,
    flag: fn(&LoanRequest) -> Decision,
    next: Decision,
  ) -> Result<()> {
    let mut expected = Fields::new();
    expected.insert(field.to_owned(), doc.get(field).cloned().unwrap_or(Value::Null));

    let applied = self
      .store
      .update_if(Collection::Loans, doc.id.clone(), expected, partial)
      .await
      .map_err(Error::store)?;
    if applied {
      return Ok(());
    }

    let current = flag(&self.load(&doc.id).await?);
    tracing::info!(loan_id = %doc.id, field, %current, "decided concurrently");
    Err(moneybox_core::Error::IllegalTransition { from: current, to: next }.into())
  }
}

fn feed_query(user_id: &str) -> CollectionQuery {
  CollectionQuery::new(Collection::Loans)
    .where_eq("userId", user_id)
    .order_by("timestamp", Direction::Descending)
}

fn sort_newest_first(loans: &mut [LoanRequest]) {
  loans.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}

// ─── Live feed ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoanFeedState {
  /// Newest first.
  pub requests: Vec<LoanRequest>,
  pub error:    Option<String>,
  pub loading:  bool,
}

impl Default for LoanFeedState {
  fn default() -> Self { Self { requests: Vec::new(), error: None, loading: true } }
}

impl LoanFeedState {
  /// Loans the administrator has ruled on that still need the member's answer.
  pub fn awaiting_decision(&self) -> impl Iterator<Item = &LoanRequest> {
    self.requests.iter().filter(|l| l.awaiting_user_decision())
  }
}

#[derive(Debug, Clone)]
pub enum LoanFeedEvent {
  Loaded(Vec<LoanRequest>),
  Failed(String),
}

impl LoanFeedEvent {
  fn decode(docs: &[StoredDocument]) -> Self {
    match docs.iter().map(LoanRequest::from_document).collect::<Result<Vec<_>, _>>() {
      Ok(loans) => Self::Loaded(loans),
      Err(e) => {
        tracing::warn!(error = %e, "loan feed decode failed");
        Self::Failed(format!("Failed to process loans data: {e}"))
      }
    }
  }

  fn subscription_failed(err: &SubscriptionError) -> Self {
    tracing::warn!(code = ?err.code, error = %err.message, "loan feed subscription error");
    Self::Failed(err.user_message("loan requests"))
  }
}

pub fn reduce_feed(state: &LoanFeedState, event: LoanFeedEvent) -> LoanFeedState {
  match event {
    LoanFeedEvent::Loaded(mut requests) => {
      sort_newest_first(&mut requests);
      LoanFeedState { requests, error: None, loading: false }
    }
    LoanFeedEvent::Failed(message) => LoanFeedState {
      requests: state.requests.clone(),
      error:    Some(message),
      loading:  false,
    },
  }
}

/// A member's own loan requests, kept current.
pub struct LoanFeed {
  inner: Coordinator<(), LoanFeedState, LoanFeedEvent>,
}

impl LoanFeed {
  pub async fn start<S: DocumentStore>(store: &S, user_id: &str) -> Self {
    let inner = Coordinator::spawn(LoanFeedState::default(), reduce_feed);
    inner
      .attach(
        store,
        (),
        feed_query(user_id),
        |docs| LoanFeedEvent::decode(&docs),
        |err| LoanFeedEvent::subscription_failed(&err),
      )
      .await;
    Self { inner }
  }

  pub fn state(&self) -> Arc<LoanFeedState> { self.inner.state() }

  pub fn watch(&self) -> watch::Receiver<Arc<LoanFeedState>> { self.inner.watch() }

  pub fn shutdown(self) { self.inner.shutdown(); }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use bytes::Bytes;
  use moneybox_store_sqlite::SqliteStore;
  use rust_decimal::Decimal;
  use serde_json::json;

  use super::*;
  use crate::testing::{CountingStorage, ManualStore, fields};

  fn request() -> NewLoanRequest {
    NewLoanRequest { amount: Decimal::from(500), name: "Ama".into(), reason: "School fees".into() }
  }

  fn pdf(name: &str) -> FileUpload { FileUpload::new(name, "application/pdf", Bytes::from_static(b"%PDF")) }

  async fn sqlite_desk() -> (Arc<SqliteStore>, LoanDesk<SqliteStore, SqliteStore>) {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    (store.clone(), LoanDesk::new(store.clone(), store))
  }

  #[tokio::test]
  async fn partial_batch_persists_only_successes() {
    let (store, desk) = sqlite_desk().await;
    let files = vec![
      pdf("id.pdf"),
      FileUpload::new("notes.txt", "text/plain", Bytes::from_static(b"hi")),
      FileUpload::new("photo.png", "image/png", Bytes::from_static(b"\x89PNG")),
    ];

    let report = desk.submit("u1", request(), files).await.unwrap();

    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(report.failed_count(), 1);
    assert!(report.message.contains("Some files failed"));

    let doc = store.get(Collection::Loans, report.loan_id.clone()).await.unwrap().unwrap();
    let loan = LoanRequest::from_document(&doc).unwrap();
    assert_eq!(loan.documents.len(), 2);
    assert_eq!(loan.status, Decision::Pending);
    assert_eq!(loan.user_decision, Decision::Pending);
    assert_eq!(loan.amount, Decimal::from(500));

    let stored = store.download(loan.documents[0].storage_path.clone()).await.unwrap().unwrap();
    assert_eq!(stored.data.as_ref(), b"%PDF");
  }

  #[tokio::test]
  async fn invalid_form_writes_nothing() {
    let store = Arc::new(ManualStore::default());
    let storage = Arc::new(CountingStorage::default());
    let desk = LoanDesk::new(store.clone(), storage.clone());

    let mut blank = request();
    blank.reason = "  ".into();
    assert!(matches!(desk.submit("u1", blank, vec![pdf("a.pdf")]).await, Err(Error::Validation(_))));
    assert!(matches!(desk.submit("u1", request(), vec![]).await, Err(Error::Validation(_))));

    let six = (0..6).map(|i| pdf(&format!("{i}.pdf"))).collect();
    assert!(matches!(desk.submit("u1", request(), six).await, Err(Error::Validation(_))));

    assert!(store.query(CollectionQuery::new(Collection::Loans)).await.unwrap().is_empty());
    assert_eq!(storage.call_count(), 0);
  }

  #[tokio::test]
  async fn all_uploads_failing_leaves_documents_empty() {
    let store = Arc::new(ManualStore::default());
    let storage = Arc::new(CountingStorage::rejecting("loans/"));
    let desk = LoanDesk::new(store.clone(), storage);

    let report = desk.submit("u1", request(), vec![pdf("a.pdf")]).await.unwrap();
    assert_eq!(report.failed_count(), 1);
    assert!(report.message.contains("none of the documents"));

    let doc = store.doc(Collection::Loans, &report.loan_id).unwrap();
    assert_eq!(doc.fields["documents"], json!([]));
  }

  #[tokio::test]
  async fn decisions_follow_the_status_gate() {
    let (_, desk) = sqlite_desk().await;
    let report = desk.submit("u1", request(), vec![pdf("a.pdf")]).await.unwrap();
    let id = report.loan_id.as_str();

    assert!(matches!(
      desk.record_decision(id, "u1", Decision::Accepted).await,
      Err(Error::AwaitingStatus(_))
    ));

    let ruled = desk.set_status(id, Decision::Accepted).await.unwrap();
    assert!(ruled.awaiting_user_decision());
    assert!(matches!(desk.set_status(id, Decision::Denied).await, Err(Error::Domain(_))));

    assert!(matches!(
      desk.record_decision(id, "someone-else", Decision::Accepted).await,
      Err(Error::NotOwner(_))
    ));

    let answered = desk.record_decision(id, "u1", Decision::Denied).await.unwrap();
    assert_eq!(answered.user_decision, Decision::Denied);
    assert!(answered.user_decision_at.is_some());

    assert!(matches!(
      desk.record_decision(id, "u1", Decision::Accepted).await,
      Err(Error::Domain(moneybox_core::Error::IllegalTransition { .. }))
    ));
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn concurrent_answers_cannot_both_win() {
    let (store, desk) = sqlite_desk().await;
    for round in 0..30 {
      let id = format!("loan{round}");
      store
        .set(
          Collection::Loans,
          id.clone(),
          fields(json!({ "userId": "u1", "amount": 10, "status": "accepted" })),
        )
        .await
        .unwrap();

      let answers: Vec<_> = [Decision::Accepted, Decision::Denied]
        .into_iter()
        .map(|decision| {
          let (desk, id) = (desk.clone(), id.clone());
          tokio::spawn(async move { desk.record_decision(&id, "u1", decision).await })
        })
        .collect();

      let mut recorded = Vec::new();
      for answer in answers {
        match answer.await.unwrap() {
          Ok(loan) => recorded.push(loan.user_decision),
          Err(Error::Domain(moneybox_core::Error::IllegalTransition { from, .. })) => {
            assert!(!from.is_pending(), "round {round}");
          }
          Err(e) => panic!("round {round}: {e}"),
        }
      }
      assert_eq!(recorded.len(), 1, "round {round}");

      let stored = desk.load(&id).await.unwrap();
      assert_eq!(stored.user_decision, recorded[0], "round {round}");
    }
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn concurrent_rulings_cannot_both_win() {
    let (_, desk) = sqlite_desk().await;
    let report = desk.submit("u1", request(), vec![pdf("a.pdf")]).await.unwrap();

    let rulings: Vec<_> = [Decision::Accepted, Decision::Denied]
      .into_iter()
      .map(|status| {
        let (desk, id) = (desk.clone(), report.loan_id.clone());
        tokio::spawn(async move { desk.set_status(&id, status).await })
      })
      .collect();

    let mut ok = 0;
    for ruling in rulings {
      if ruling.await.unwrap().is_ok() {
        ok += 1;
      }
    }
    assert_eq!(ok, 1);

    let loan = desk.load(&report.loan_id).await.unwrap();
    assert_eq!(loan.documents.len(), 1);
  }

  #[tokio::test]
  async fn same_named_attachments_both_persist() {
    let (store, desk) = sqlite_desk().await;
    let files = vec![
      FileUpload::new("scan.pdf", "application/pdf", Bytes::from_static(b"%PDF-front")),
      FileUpload::new("scan.pdf", "application/pdf", Bytes::from_static(b"%PDF-back")),
    ];

    let report = desk.submit("u1", request(), files).await.unwrap();
    assert_eq!(report.failed_count(), 0);

    let paths: Vec<_> = report.uploaded().map(|d| d.storage_path.clone()).collect();
    assert_eq!(paths.len(), 2);
    assert_ne!(paths[0], paths[1]);

    let front = store.download(paths[0].clone()).await.unwrap().unwrap();
    let back = store.download(paths[1].clone()).await.unwrap().unwrap();
    assert_eq!(front.data.as_ref(), b"%PDF-front");
    assert_eq!(back.data.as_ref(), b"%PDF-back");
  }

  #[tokio::test]
  async fn unknown_loan_is_not_found() {
    let (_, desk) = sqlite_desk().await;
    assert!(matches!(desk.set_status("ghost", Decision::Accepted).await, Err(Error::LoanNotFound(_))));
  }

  #[tokio::test]
  async fn feed_shows_only_own_loans_newest_first() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    for (id, user, ts) in [("a", "u1", 1_000), ("b", "u2", 2_000), ("c", "u1", 3_000)] {
      store
        .set(Collection::Loans, id.into(), fields(json!({ "userId": user, "amount": 1, "timestamp": ts })))
        .await
        .unwrap();
    }

    let feed = LoanFeed::start(&store, "u1").await;
    let mut rx = feed.watch();
    let state = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| !s.loading))
      .await
      .unwrap()
      .unwrap()
      .clone();
    let ids: Vec<_> = state.requests.iter().map(|l| l.id.as_str()).collect();
    assert_eq!(ids, ["c", "a"]);

    store
      .update(Collection::Loans, "a".into(), fields(json!({ "status": "accepted" })))
      .await
      .unwrap();
    let state = tokio::time::timeout(
      Duration::from_secs(5),
      rx.wait_for(|s| s.awaiting_decision().count() == 1),
    )
    .await
    .unwrap()
    .unwrap()
    .clone();
    assert_eq!(state.awaiting_decision().next().map(|l| l.id.as_str()), Some("a"));
    feed.shutdown();
  }

  #[test]
  fn failed_feed_keeps_last_requests() {
    let loaded = reduce_feed(&LoanFeedState::default(), LoanFeedEvent::Loaded(vec![]));
    assert!(!loaded.loading);
    let failed = reduce_feed(&loaded, LoanFeedEvent::Failed("offline".into()));
    assert_eq!(failed.error.as_deref(), Some("offline"));
  }
}
