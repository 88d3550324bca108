use chrono::{DateTime, Utc};

use crate::api::Snapshot;
use crate::model::{
    AdmissionView, Bed, ExamSchedule, IvRecord, MealRequest, Notification, NotificationKind,
    Scope, StationView, ViewModel, Vital, document_label, fever_status, meal_label,
};
use crate::protocol::PushEvent;

/// How close an authoritative timestamp must be to an optimistic entry's to
/// count as the same reading when no identity has been assigned yet.
pub const RECONCILE_WINDOW_MS: i64 = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
    Empty,
    Populated,
    /// Terminal: the scope's token is invalid or the admission was
    /// discharged. All further pushes and fetch results are ignored.
    Invalidated,
}

/// What the session must do after a push event was consumed. The reducer is
/// pure state; all I/O stays in the session actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The view model was mutated in place (or the apply was a no-op).
    Applied,
    /// Event does not concern this scope.
    Ignored,
    /// Cheaper to re-derive from a fresh snapshot; collapse bursts.
    RefetchDebounced,
    /// Bed-to-admission mapping may have changed; refetch immediately.
    RefetchNow,
    /// The current admission was discharged; fire the callback and stop.
    Discharged,
}

/// Per-scope view-model state machine consuming snapshots and push events.
pub struct Reducer {
    scope: Scope,
    state: ViewState,
    view: ViewModel,
}

impl Reducer {
    pub fn new(scope: Scope) -> Self {
        let view = ViewModel::empty_for(&scope);
        Self {
            scope,
            state: ViewState::Empty,
            view,
        }
    }

    pub fn state(&self) -> ViewState {
        self.state
    }

    pub fn view(&self) -> &ViewModel {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut ViewModel {
        &mut self.view
    }

    /// Entered on an authorization/not-found snapshot failure or a discharge
    /// event. Terminal.
    pub fn invalidate(&mut self) {
        self.state = ViewState::Invalidated;
    }

    /// Wholesale collection replacement, except optimistic entries with no
    /// server-side counterpart survive until their own call site settles
    /// them.
    pub fn apply_snapshot(&mut self, snapshot: Snapshot) {
        if self.state == ViewState::Invalidated {
            return;
        }
        match (&mut self.view, snapshot) {
            (ViewModel::Station(view), Snapshot::Station(rows)) => {
                apply_station_snapshot(view, rows);
            }
            (ViewModel::Admission(view), Snapshot::Dashboard(dashboard)) => {
                apply_dashboard_snapshot(view, *dashboard);
            }
            (_, snapshot) => {
                tracing::warn!(
                    target = "wardview::sync",
                    scope = self.scope.channel_name(),
                    "snapshot shape does not match scope: {snapshot:?}"
                );
                return;
            }
        }
        self.state = ViewState::Populated;
    }

    pub fn apply_push(&mut self, event: &PushEvent) -> Outcome {
        if self.state == ViewState::Invalidated {
            return Outcome::Ignored;
        }
        match &mut self.view {
            ViewModel::Station(view) => apply_station_push(view, event),
            ViewModel::Admission(view) => {
                let outcome = apply_admission_push(view, event);
                if outcome == Outcome::Discharged {
                    self.state = ViewState::Invalidated;
                }
                outcome
            }
        }
    }
}

fn apply_station_snapshot(view: &mut StationView, rows: Vec<crate::model::AdmissionSummary>) {
    let mut beds: Vec<Bed> = crate::model::ROOM_NUMBERS
        .iter()
        .map(|room| Bed::vacant(room))
        .collect();
    for summary in rows {
        let Some(bed) = beds
            .iter_mut()
            .find(|bed| bed.room.trim() == summary.room_number.trim())
        else {
            tracing::warn!(
                target = "wardview::sync",
                room = %summary.room_number,
                "admission references a room outside the ward layout"
            );
            continue;
        };
        let temperature = summary
            .latest_temp
            .unwrap_or(crate::model::DEFAULT_TEMPERATURE);
        bed.admission_id = Some(summary.id);
        bed.patient_name = summary.display_name;
        bed.token = Some(summary.access_token);
        bed.infusion_rate = summary
            .latest_iv
            .map(|iv| iv.infusion_rate)
            .unwrap_or(crate::model::DEFAULT_INFUSION_RATE);
        bed.temperature = temperature;
        bed.had_fever_in_6h = summary.had_fever_in_6h;
        bed.fever = fever_status(temperature, summary.had_fever_in_6h);
    }
    // Alerts and the last IV upload are station-local; a snapshot does not
    // rewrite them.
    view.beds = beds;
}

fn apply_dashboard_snapshot(view: &mut AdmissionView, dashboard: crate::model::DashboardSnapshot) {
    let crate::model::DashboardSnapshot {
        admission,
        vitals,
        iv_records,
        meals,
        exam_schedules,
        document_requests,
    } = dashboard;

    let kept_vitals: Vec<Vital> = view
        .vitals
        .iter()
        .filter(|existing| {
            existing.is_optimistic
                && !vitals
                    .iter()
                    .any(|incoming| within_window(incoming.recorded_at, existing.recorded_at))
        })
        .cloned()
        .collect();
    let kept_ivs: Vec<IvRecord> = view
        .iv_records
        .iter()
        .filter(|existing| {
            existing.is_optimistic
                && !iv_records
                    .iter()
                    .any(|incoming| within_window(incoming.created_at, existing.created_at))
        })
        .cloned()
        .collect();
    let kept_meals: Vec<MealRequest> = view
        .meals
        .iter()
        .filter(|existing| {
            existing.is_optimistic
                && !meals
                    .iter()
                    .any(|incoming| incoming.slot_key() == existing.slot_key())
        })
        .cloned()
        .collect();
    let kept_exams: Vec<ExamSchedule> = view
        .exam_schedules
        .iter()
        .filter(|existing| {
            existing.is_optimistic
                && !exam_schedules.iter().any(|incoming| {
                    incoming.name == existing.name
                        && within_window(incoming.scheduled_at, existing.scheduled_at)
                })
        })
        .cloned()
        .collect();

    view.admission = Some(admission);
    view.vitals = vitals;
    view.vitals.extend(kept_vitals);
    view.iv_records = iv_records;
    view.iv_records.extend(kept_ivs);
    view.meals = meals;
    view.meals.extend(kept_meals);
    view.exam_schedules = exam_schedules;
    view.exam_schedules.extend(kept_exams);
    view.document_requests = document_requests;

    view.sort_vitals();
    view.sort_iv_records();
    view.sort_meals();
    view.sort_exam_schedules();
    view.sort_document_requests();
}

fn apply_station_push(view: &mut StationView, event: &PushEvent) -> Outcome {
    match event {
        PushEvent::NewVital(ev) => {
            let index = ev
                .room
                .as_deref()
                .and_then(|room| view.beds.iter().position(|bed| bed.room == room))
                .or_else(|| {
                    view.beds.iter().position(|bed| {
                        bed.admission_id.as_deref() == Some(ev.vital.admission_id.as_str())
                    })
                });
            if let Some(bed) = index.map(|i| &mut view.beds[i]) {
                bed.temperature = ev.vital.temperature;
                if ev.vital.temperature >= crate::model::FEVER_THRESHOLD {
                    bed.had_fever_in_6h = true;
                }
                bed.fever = fever_status(bed.temperature, bed.had_fever_in_6h);
            }
            Outcome::Applied
        }
        PushEvent::NewIv(ev) => {
            let index = ev
                .room
                .as_deref()
                .and_then(|room| view.beds.iter().position(|bed| bed.room == room))
                .or_else(|| {
                    view.beds.iter().position(|bed| {
                        bed.admission_id.as_deref() == Some(ev.record.admission_id.as_str())
                    })
                });
            if let Some(bed) = index.map(|i| &mut view.beds[i]) {
                bed.infusion_rate = ev.record.infusion_rate;
            }
            Outcome::Applied
        }
        PushEvent::NewMealRequest(ev) => {
            let label = meal_label(&ev.request.request_type);
            view.notifications.insert(
                0,
                Notification {
                    id: uuid::Uuid::new_v4(),
                    room: ev.room.clone().unwrap_or_default(),
                    kind: NotificationKind::Meal,
                    content: format!("meal request ({label})"),
                },
            );
            Outcome::Applied
        }
        PushEvent::NewDocRequest(ev) => {
            let items = ev
                .request_items
                .iter()
                .map(|code| document_label(code))
                .collect::<Vec<_>>()
                .join(", ");
            view.notifications.insert(
                0,
                Notification {
                    id: uuid::Uuid::new_v4(),
                    room: ev.room.clone().unwrap_or_default(),
                    kind: NotificationKind::Document,
                    content: format!("document request ({items})"),
                },
            );
            Outcome::Applied
        }
        PushEvent::IvPhotoUploaded(ev) => {
            view.last_uploaded_iv = Some(crate::model::LastUploadedIv {
                admission_id: ev.admission_id.clone(),
                photo_url: ev.photo_url.clone(),
            });
            Outcome::Applied
        }
        PushEvent::NewExamSchedule(_) | PushEvent::DeleteExamSchedule(_) => Outcome::Ignored,
        PushEvent::AdmissionTransferred(_) | PushEvent::AdmissionDischarged(_) => {
            Outcome::RefetchNow
        }
    }
}

fn apply_admission_push(view: &mut AdmissionView, event: &PushEvent) -> Outcome {
    match event {
        PushEvent::NewVital(ev) => {
            merge_vital(view, ev.vital.clone());
            Outcome::Applied
        }
        PushEvent::NewIv(ev) => {
            merge_iv(view, ev.record.clone());
            Outcome::Applied
        }
        PushEvent::NewMealRequest(ev) => {
            merge_meal(view, ev.request.clone());
            Outcome::Applied
        }
        PushEvent::NewExamSchedule(ev) => {
            merge_exam(view, ev.schedule.clone());
            Outcome::Applied
        }
        PushEvent::DeleteExamSchedule(ev) => {
            // Replays of the same deletion find nothing to remove.
            view.exam_schedules.retain(|exam| exam.id != Some(ev.id));
            Outcome::Applied
        }
        PushEvent::NewDocRequest(_)
        | PushEvent::IvPhotoUploaded(_)
        | PushEvent::AdmissionTransferred(_) => Outcome::RefetchDebounced,
        PushEvent::AdmissionDischarged(ev) => {
            let matches = view
                .admission
                .as_ref()
                .map(|admission| admission.id == ev.admission_id)
                // The channel itself is token-scoped; before the first
                // snapshot lands, trust the routing.
                .unwrap_or(true);
            if matches {
                Outcome::Discharged
            } else {
                Outcome::Ignored
            }
        }
    }
}

fn within_window(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    (a - b).num_milliseconds().abs() <= RECONCILE_WINDOW_MS
}

/// Direct merge: identity overwrite first, then reconciliation against an
/// optimistic entry by timestamp proximity (FIFO by creation tag when two
/// optimistic entries both match), otherwise a sorted insert.
fn merge_vital(view: &mut AdmissionView, incoming: Vital) {
    if let Some(id) = incoming.id {
        if let Some(existing) = view
            .vitals
            .iter_mut()
            .find(|vital| vital.id == Some(id) && !vital.is_optimistic)
        {
            *existing = incoming;
            return;
        }
    }
    let reconciled = view
        .vitals
        .iter()
        .enumerate()
        .filter(|(_, vital)| vital.is_optimistic)
        .filter(|(_, vital)| within_window(vital.recorded_at, incoming.recorded_at))
        .min_by_key(|(_, vital)| vital.entry_tag)
        .map(|(index, _)| index);
    if let Some(index) = reconciled {
        // Position preserved: the optimistic entry already sits where the
        // reading belongs.
        view.vitals[index] = incoming;
        return;
    }
    view.vitals.push(incoming);
    view.sort_vitals();
}

fn merge_iv(view: &mut AdmissionView, incoming: IvRecord) {
    if let Some(id) = incoming.id {
        if let Some(existing) = view
            .iv_records
            .iter_mut()
            .find(|record| record.id == Some(id) && !record.is_optimistic)
        {
            *existing = incoming;
            return;
        }
    }
    let reconciled = view
        .iv_records
        .iter()
        .enumerate()
        .filter(|(_, record)| record.is_optimistic)
        .filter(|(_, record)| within_window(record.created_at, incoming.created_at))
        .min_by_key(|(_, record)| record.entry_tag)
        .map(|(index, _)| index);
    if let Some(index) = reconciled {
        view.iv_records[index] = incoming;
        return;
    }
    view.iv_records.push(incoming);
    view.sort_iv_records();
}

/// Meals merge on the backend's upsert key (admission, date, slot); the
/// broadcast carries no row id.
fn merge_meal(view: &mut AdmissionView, incoming: MealRequest) {
    if let Some(key) = incoming.slot_key() {
        if let Some(existing) = view
            .meals
            .iter_mut()
            .find(|meal| meal.slot_key() == Some(key))
        {
            *existing = incoming;
            return;
        }
    }
    view.meals.push(incoming);
    view.sort_meals();
}

fn merge_exam(view: &mut AdmissionView, incoming: ExamSchedule) {
    if let Some(id) = incoming.id {
        if let Some(existing) = view
            .exam_schedules
            .iter_mut()
            .find(|exam| exam.id == Some(id) && !exam.is_optimistic)
        {
            *existing = incoming;
            return;
        }
    }
    let reconciled = view
        .exam_schedules
        .iter()
        .enumerate()
        .filter(|(_, exam)| exam.is_optimistic)
        .filter(|(_, exam)| {
            exam.name == incoming.name && within_window(exam.scheduled_at, incoming.scheduled_at)
        })
        .min_by_key(|(_, exam)| exam.entry_tag)
        .map(|(index, _)| index);
    if let Some(index) = reconciled {
        view.exam_schedules[index] = incoming;
        return;
    }
    view.exam_schedules.push(incoming);
    view.sort_exam_schedules();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AdmissionMeta, AdmissionSummary, DashboardSnapshot, LatestIv};
    use crate::protocol::{
        AdmissionDischarged, AdmissionTransferred, DocumentEvent, ExamDeleted, ExamEvent, IvEvent,
        VitalEvent,
    };
    use chrono::TimeZone;
    use uuid::Uuid;

    fn ts(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
    }

    fn server_vital(id: i64, seconds: i64, temperature: f64) -> Vital {
        Vital {
            id: Some(id),
            admission_id: "adm-1".into(),
            temperature,
            has_medication: false,
            medication_type: None,
            recorded_at: ts(seconds),
            temp_id: None,
            is_optimistic: false,
            entry_tag: 0,
        }
    }

    fn optimistic_vital(seconds: i64, temperature: f64, tag: u64) -> Vital {
        Vital {
            id: None,
            admission_id: "adm-1".into(),
            temperature,
            has_medication: false,
            medication_type: None,
            recorded_at: ts(seconds),
            temp_id: Some(Uuid::new_v4()),
            is_optimistic: true,
            entry_tag: tag,
        }
    }

    fn admission_meta() -> AdmissionMeta {
        AdmissionMeta {
            id: "adm-1".into(),
            display_name: "Kim*".into(),
            room_number: "301".into(),
            dob: None,
            gender: None,
            check_in_at: None,
            access_token: Some("tok-1".into()),
            status: None,
        }
    }

    fn dashboard(vitals: Vec<Vital>) -> Snapshot {
        Snapshot::Dashboard(Box::new(DashboardSnapshot {
            admission: admission_meta(),
            vitals,
            iv_records: Vec::new(),
            meals: Vec::new(),
            exam_schedules: Vec::new(),
            document_requests: Vec::new(),
        }))
    }

    fn admission_reducer() -> Reducer {
        Reducer::new(Scope::Admission {
            token: "tok-1".into(),
        })
    }

    #[test]
    fn station_snapshot_fills_occupied_beds() {
        let mut reducer = Reducer::new(Scope::Station);
        reducer.apply_snapshot(Snapshot::Station(vec![AdmissionSummary {
            id: "adm-1".into(),
            display_name: "Kim*".into(),
            room_number: "303".into(),
            access_token: "tok-1".into(),
            latest_iv: Some(LatestIv { infusion_rate: 35 }),
            latest_temp: Some(38.4),
            had_fever_in_6h: false,
        }]));

        assert_eq!(reducer.state(), ViewState::Populated);
        let view = reducer.view().as_station().unwrap();
        let bed = view.beds.iter().find(|bed| bed.room == "303").unwrap();
        assert!(bed.occupied());
        assert_eq!(bed.infusion_rate, 35);
        assert!(bed.fever);
        assert!(view.beds.iter().filter(|bed| bed.occupied()).count() == 1);
    }

    #[test]
    fn push_apply_is_idempotent() {
        let mut reducer = admission_reducer();
        reducer.apply_snapshot(dashboard(vec![server_vital(1, 0, 37.0)]));

        let event = PushEvent::NewVital(VitalEvent {
            vital: server_vital(2, 60, 37.8),
            room: None,
        });
        assert_eq!(reducer.apply_push(&event), Outcome::Applied);
        let after_once = reducer.view().clone();
        assert_eq!(reducer.apply_push(&event), Outcome::Applied);
        assert_eq!(reducer.view(), &after_once);

        let view = reducer.view().as_admission().unwrap();
        assert_eq!(view.vitals.len(), 2);
        // Newest first.
        assert_eq!(view.vitals[0].id, Some(2));
    }

    #[test]
    fn optimistic_vital_is_reconciled_in_place() {
        let mut reducer = admission_reducer();
        reducer.apply_snapshot(dashboard(vec![server_vital(1, 100, 37.0)]));
        {
            let view = reducer.view_mut();
            let ViewModel::Admission(view) = view else {
                unreachable!()
            };
            view.vitals.push(optimistic_vital(160, 38.1, 1));
            view.sort_vitals();
        }
        let positions_before: Vec<Option<i64>> = reducer
            .view()
            .as_admission()
            .unwrap()
            .vitals
            .iter()
            .map(|vital| vital.id)
            .collect();

        // Authoritative reading lands 1s after the optimistic timestamp.
        let event = PushEvent::NewVital(VitalEvent {
            vital: server_vital(9, 161, 38.1),
            room: None,
        });
        reducer.apply_push(&event);

        let view = reducer.view().as_admission().unwrap();
        assert_eq!(view.vitals.len(), positions_before.len());
        assert_eq!(view.vitals[0].id, Some(9));
        assert!(!view.vitals[0].is_optimistic);
    }

    #[test]
    fn double_optimistic_match_resolves_fifo() {
        let mut reducer = admission_reducer();
        reducer.apply_snapshot(dashboard(Vec::new()));
        {
            let ViewModel::Admission(view) = reducer.view_mut() else {
                unreachable!()
            };
            view.vitals.push(optimistic_vital(10, 37.1, 1));
            view.vitals.push(optimistic_vital(11, 37.2, 2));
            view.sort_vitals();
        }

        let event = PushEvent::NewVital(VitalEvent {
            vital: server_vital(5, 10, 37.1),
            room: None,
        });
        reducer.apply_push(&event);

        let view = reducer.view().as_admission().unwrap();
        let still_optimistic: Vec<u64> = view
            .vitals
            .iter()
            .filter(|vital| vital.is_optimistic)
            .map(|vital| vital.entry_tag)
            .collect();
        // The earlier-created optimistic entry was consumed first.
        assert_eq!(still_optimistic, vec![2]);
    }

    #[test]
    fn snapshot_preserves_unreconciled_optimistic_entries() {
        let mut reducer = admission_reducer();
        reducer.apply_snapshot(dashboard(Vec::new()));
        {
            let ViewModel::Admission(view) = reducer.view_mut() else {
                unreachable!()
            };
            // One entry the server already knows about, one still in flight.
            view.vitals.push(optimistic_vital(50, 37.5, 1));
            view.vitals.push(optimistic_vital(500, 39.0, 2));
            view.sort_vitals();
        }

        reducer.apply_snapshot(dashboard(vec![server_vital(7, 51, 37.5)]));

        let view = reducer.view().as_admission().unwrap();
        assert_eq!(view.vitals.len(), 2);
        assert!(view.vitals.iter().any(|vital| vital.id == Some(7)));
        assert!(
            view.vitals
                .iter()
                .any(|vital| vital.is_optimistic && vital.entry_tag == 2)
        );
    }

    #[test]
    fn discharge_is_terminal_for_the_admission_scope() {
        let mut reducer = admission_reducer();
        reducer.apply_snapshot(dashboard(vec![server_vital(1, 0, 37.0)]));

        let discharge = PushEvent::AdmissionDischarged(AdmissionDischarged {
            admission_id: "adm-1".into(),
            room: Some("301".into()),
        });
        assert_eq!(reducer.apply_push(&discharge), Outcome::Discharged);
        assert_eq!(reducer.state(), ViewState::Invalidated);

        // Subsequent pushes and snapshots bounce off.
        let event = PushEvent::NewVital(VitalEvent {
            vital: server_vital(2, 60, 39.0),
            room: None,
        });
        assert_eq!(reducer.apply_push(&event), Outcome::Ignored);
        reducer.apply_snapshot(dashboard(vec![server_vital(3, 90, 36.9)]));
        assert_eq!(reducer.view().as_admission().unwrap().vitals.len(), 1);
    }

    #[test]
    fn discharge_for_another_admission_is_ignored() {
        let mut reducer = admission_reducer();
        reducer.apply_snapshot(dashboard(Vec::new()));
        let discharge = PushEvent::AdmissionDischarged(AdmissionDischarged {
            admission_id: "adm-other".into(),
            room: None,
        });
        assert_eq!(reducer.apply_push(&discharge), Outcome::Ignored);
        assert_eq!(reducer.state(), ViewState::Populated);
    }

    #[test]
    fn exam_delete_is_idempotent() {
        let mut reducer = admission_reducer();
        reducer.apply_snapshot(Snapshot::Dashboard(Box::new(DashboardSnapshot {
            admission: admission_meta(),
            vitals: Vec::new(),
            iv_records: Vec::new(),
            meals: Vec::new(),
            exam_schedules: vec![ExamSchedule {
                id: Some(7),
                admission_id: "adm-1".into(),
                scheduled_at: ts(0),
                name: "chest x-ray".into(),
                note: None,
                temp_id: None,
                is_optimistic: false,
                entry_tag: 0,
            }],
            document_requests: Vec::new(),
        })));

        let event = PushEvent::DeleteExamSchedule(ExamDeleted {
            id: 7,
            admission_id: "adm-1".into(),
            room: None,
        });
        assert_eq!(reducer.apply_push(&event), Outcome::Applied);
        assert!(
            reducer
                .view()
                .as_admission()
                .unwrap()
                .exam_schedules
                .is_empty()
        );
        assert_eq!(reducer.apply_push(&event), Outcome::Applied);
    }

    #[test]
    fn exam_insert_keeps_chronological_order() {
        let mut reducer = admission_reducer();
        reducer.apply_snapshot(dashboard(Vec::new()));
        for (id, seconds) in [(2, 7_200), (1, 3_600), (3, 10_800)] {
            let event = PushEvent::NewExamSchedule(ExamEvent {
                schedule: ExamSchedule {
                    id: Some(id),
                    admission_id: "adm-1".into(),
                    scheduled_at: ts(seconds),
                    name: "ultrasound".into(),
                    note: None,
                    temp_id: None,
                    is_optimistic: false,
                    entry_tag: 0,
                },
                room: None,
            });
            reducer.apply_push(&event);
        }
        let ids: Vec<Option<i64>> = reducer
            .view()
            .as_admission()
            .unwrap()
            .exam_schedules
            .iter()
            .map(|exam| exam.id)
            .collect();
        assert_eq!(ids, vec![Some(1), Some(2), Some(3)]);
    }

    #[test]
    fn document_and_photo_events_request_debounced_refetch() {
        let mut reducer = admission_reducer();
        reducer.apply_snapshot(dashboard(Vec::new()));
        let doc = PushEvent::NewDocRequest(DocumentEvent {
            room: Some("301".into()),
            request_items: vec!["RECEIPT".into()],
        });
        assert_eq!(reducer.apply_push(&doc), Outcome::RefetchDebounced);

        let transfer = PushEvent::AdmissionTransferred(AdmissionTransferred {
            admission_id: "adm-1".into(),
            old_room: Some("301".into()),
            new_room: Some("305".into()),
        });
        assert_eq!(reducer.apply_push(&transfer), Outcome::RefetchDebounced);
    }

    #[test]
    fn station_structural_events_force_refetch() {
        let mut reducer = Reducer::new(Scope::Station);
        reducer.apply_snapshot(Snapshot::Station(Vec::new()));
        let transfer = PushEvent::AdmissionTransferred(AdmissionTransferred {
            admission_id: "adm-1".into(),
            old_room: None,
            new_room: None,
        });
        assert_eq!(reducer.apply_push(&transfer), Outcome::RefetchNow);
        let discharge = PushEvent::AdmissionDischarged(AdmissionDischarged {
            admission_id: "adm-1".into(),
            room: None,
        });
        assert_eq!(reducer.apply_push(&discharge), Outcome::RefetchNow);
    }

    #[test]
    fn station_vital_and_iv_update_the_bed_card() {
        let mut reducer = Reducer::new(Scope::Station);
        reducer.apply_snapshot(Snapshot::Station(vec![AdmissionSummary {
            id: "adm-1".into(),
            display_name: "Lee*".into(),
            room_number: "305".into(),
            access_token: "tok-1".into(),
            latest_iv: None,
            latest_temp: Some(36.6),
            had_fever_in_6h: false,
        }]));

        reducer.apply_push(&PushEvent::NewVital(VitalEvent {
            vital: server_vital(1, 0, 38.6),
            room: Some("305".into()),
        }));
        reducer.apply_push(&PushEvent::NewIv(IvEvent {
            record: IvRecord {
                id: Some(1),
                admission_id: "adm-1".into(),
                photo_url: None,
                infusion_rate: 45,
                created_at: ts(0),
                temp_id: None,
                is_optimistic: false,
                entry_tag: 0,
            },
            room: Some("305".into()),
        }));

        let view = reducer.view().as_station().unwrap();
        let bed = view.beds.iter().find(|bed| bed.room == "305").unwrap();
        assert_eq!(bed.temperature, 38.6);
        assert!(bed.fever);
        assert_eq!(bed.infusion_rate, 45);
    }

    #[test]
    fn station_events_without_room_match_by_admission() {
        let mut reducer = Reducer::new(Scope::Station);
        reducer.apply_snapshot(Snapshot::Station(vec![AdmissionSummary {
            id: "adm-1".into(),
            display_name: "Park*".into(),
            room_number: "307".into(),
            access_token: "tok-1".into(),
            latest_iv: None,
            latest_temp: Some(36.9),
            had_fever_in_6h: false,
        }]));

        reducer.apply_push(&PushEvent::NewVital(VitalEvent {
            vital: server_vital(1, 0, 38.1),
            room: None,
        }));
        reducer.apply_push(&PushEvent::NewIv(IvEvent {
            record: IvRecord {
                id: Some(1),
                admission_id: "adm-1".into(),
                photo_url: None,
                infusion_rate: 60,
                created_at: ts(0),
                temp_id: None,
                is_optimistic: false,
                entry_tag: 0,
            },
            room: None,
        }));

        let view = reducer.view().as_station().unwrap();
        let bed = view.beds.iter().find(|bed| bed.room == "307").unwrap();
        assert_eq!(bed.temperature, 38.1);
        assert_eq!(bed.infusion_rate, 60);
    }

    #[test]
    fn station_requests_become_notifications() {
        let mut reducer = Reducer::new(Scope::Station);
        reducer.apply_snapshot(Snapshot::Station(Vec::new()));

        reducer.apply_push(&PushEvent::NewMealRequest(crate::protocol::MealEvent {
            request: MealRequest {
                id: None,
                admission_id: "adm-1".into(),
                request_type: "SOFT".into(),
                meal_date: None,
                meal_time: None,
                pediatric_meal_type: None,
                guardian_meal_type: None,
                room_note: None,
                created_at: None,
                temp_id: None,
                is_optimistic: false,
                entry_tag: 0,
            },
            room: Some("302".into()),
        }));
        reducer.apply_push(&PushEvent::NewDocRequest(DocumentEvent {
            room: Some("302".into()),
            request_items: vec!["RECEIPT".into(), "CERT".into()],
        }));

        let view = reducer.view().as_station().unwrap();
        assert_eq!(view.notifications.len(), 2);
        // Newest first.
        assert_eq!(view.notifications[0].kind, NotificationKind::Document);
        assert!(view.notifications[0].content.contains("billing receipt"));
        assert!(view.notifications[1].content.contains("soft diet"));
    }

    #[test]
    fn meal_merge_upserts_on_date_and_slot() {
        use crate::model::MealSlot;
        let mut reducer = admission_reducer();
        reducer.apply_snapshot(dashboard(Vec::new()));

        let mut request = MealRequest {
            id: None,
            admission_id: "adm-1".into(),
            request_type: "GENERAL".into(),
            meal_date: Some("2026-08-25".parse().unwrap()),
            meal_time: Some(MealSlot::Lunch),
            pediatric_meal_type: Some("general".into()),
            guardian_meal_type: None,
            room_note: None,
            created_at: None,
            temp_id: None,
            is_optimistic: false,
            entry_tag: 0,
        };
        reducer.apply_push(&PushEvent::NewMealRequest(crate::protocol::MealEvent {
            request: request.clone(),
            room: None,
        }));
        request.request_type = "NPO".into();
        reducer.apply_push(&PushEvent::NewMealRequest(crate::protocol::MealEvent {
            request,
            room: None,
        }));

        let view = reducer.view().as_admission().unwrap();
        assert_eq!(view.meals.len(), 1);
        assert_eq!(view.meals[0].request_type, "NPO");
    }
}
