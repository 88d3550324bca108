use chrono::Utc;
use uuid::Uuid;

use crate::api::{ExamDraft, IvDraft, MealRequestDraft, VitalDraft};
use crate::model::{AdmissionView, ExamSchedule, IvRecord, MealRequest, Vital};

/// Reverses one optimistic apply. Produced by [`OptimisticManager`], consumed
/// by the session when the corresponding write fails.
#[derive(Debug, Clone, PartialEq)]
pub enum Undo {
    VitalCreated { temp_id: Uuid },
    IvCreated { temp_id: Uuid },
    MealUpserted { temp_id: Uuid, previous: Option<MealRequest> },
    ExamCreated { temp_id: Uuid },
    ExamDeleted { index: usize, schedule: ExamSchedule },
    DocumentPatched { id: i64, previous: Option<String> },
}

/// Applies mutations to the admission view immediately, before the server
/// confirms them. Each apply returns an [`Undo`] token restoring the exact
/// prior state; reconciling the optimistic entry against the authoritative
/// record is the reducer's job. The manager never retries or rolls back on
/// its own.
#[derive(Debug, Default)]
pub struct OptimisticManager {
    next_tag: u64,
}

impl OptimisticManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn tag(&mut self) -> u64 {
        let tag = self.next_tag;
        self.next_tag += 1;
        tag
    }

    pub fn create_vital(&mut self, view: &mut AdmissionView, draft: &VitalDraft) -> Undo {
        let temp_id = Uuid::new_v4();
        view.vitals.push(Vital {
            id: None,
            admission_id: draft.admission_id.clone(),
            temperature: draft.temperature,
            has_medication: draft.has_medication,
            medication_type: draft.medication_type.clone(),
            recorded_at: draft.recorded_at,
            temp_id: Some(temp_id),
            is_optimistic: true,
            entry_tag: self.tag(),
        });
        view.sort_vitals();
        Undo::VitalCreated { temp_id }
    }

    pub fn create_iv(&mut self, view: &mut AdmissionView, draft: &IvDraft) -> Undo {
        let temp_id = Uuid::new_v4();
        view.iv_records.push(IvRecord {
            id: None,
            admission_id: draft.admission_id.clone(),
            photo_url: draft.photo_url.clone(),
            infusion_rate: draft.infusion_rate,
            created_at: Utc::now(),
            temp_id: Some(temp_id),
            is_optimistic: true,
            entry_tag: self.tag(),
        });
        view.sort_iv_records();
        Undo::IvCreated { temp_id }
    }

    /// Mirrors the server-side upsert: replaces an existing row for the same
    /// (date, slot), keeping its id so a later broadcast still matches.
    pub fn upsert_meal(&mut self, view: &mut AdmissionView, draft: &MealRequestDraft) -> Undo {
        let temp_id = Uuid::new_v4();
        let entry = MealRequest {
            id: None,
            admission_id: draft.admission_id.clone(),
            request_type: draft.request_type.clone(),
            meal_date: Some(draft.meal_date),
            meal_time: Some(draft.meal_time),
            pediatric_meal_type: draft.pediatric_meal_type.clone(),
            guardian_meal_type: draft.guardian_meal_type.clone(),
            room_note: draft.room_note.clone(),
            created_at: Some(Utc::now()),
            temp_id: Some(temp_id),
            is_optimistic: true,
            entry_tag: self.tag(),
        };
        let key = entry.slot_key();
        debug_assert!(key.is_some());
        let existing = view.meals.iter_mut().find(|meal| meal.slot_key() == key);
        let previous = match existing {
            Some(slot) => {
                let previous = slot.clone();
                let mut entry = entry;
                entry.id = previous.id;
                *slot = entry;
                Some(previous)
            }
            None => {
                view.meals.push(entry);
                view.sort_meals();
                None
            }
        };
        Undo::MealUpserted { temp_id, previous }
    }

    pub fn create_exam(&mut self, view: &mut AdmissionView, draft: &ExamDraft) -> Undo {
        let temp_id = Uuid::new_v4();
        view.exam_schedules.push(ExamSchedule {
            id: None,
            admission_id: draft.admission_id.clone(),
            scheduled_at: draft.scheduled_at,
            name: draft.name.clone(),
            note: draft.note.clone(),
            temp_id: Some(temp_id),
            is_optimistic: true,
            entry_tag: self.tag(),
        });
        view.sort_exam_schedules();
        Undo::ExamCreated { temp_id }
    }

    /// Removes the schedule immediately, remembering where it sat so a
    /// rollback puts it back in the same position.
    pub fn delete_exam(&mut self, view: &mut AdmissionView, id: i64) -> Option<Undo> {
        let index = view
            .exam_schedules
            .iter()
            .position(|exam| exam.id == Some(id))?;
        let schedule = view.exam_schedules.remove(index);
        Some(Undo::ExamDeleted { index, schedule })
    }

    pub fn patch_document(
        &mut self,
        view: &mut AdmissionView,
        id: i64,
        status: &str,
    ) -> Option<Undo> {
        let request = view
            .document_requests
            .iter_mut()
            .find(|request| request.id == Some(id))?;
        let previous = request.status.take();
        request.status = Some(status.to_string());
        request.is_optimistic = true;
        Some(Undo::DocumentPatched { id, previous })
    }

    pub fn rollback(&mut self, view: &mut AdmissionView, undo: Undo) {
        match undo {
            Undo::VitalCreated { temp_id } => {
                view.vitals.retain(|vital| vital.temp_id != Some(temp_id));
            }
            Undo::IvCreated { temp_id } => {
                view.iv_records
                    .retain(|record| record.temp_id != Some(temp_id));
            }
            Undo::MealUpserted { temp_id, previous } => match previous {
                Some(previous) => {
                    if let Some(slot) = view
                        .meals
                        .iter_mut()
                        .find(|meal| meal.temp_id == Some(temp_id))
                    {
                        *slot = previous;
                    }
                }
                None => {
                    view.meals.retain(|meal| meal.temp_id != Some(temp_id));
                }
            },
            Undo::ExamCreated { temp_id } => {
                view.exam_schedules
                    .retain(|exam| exam.temp_id != Some(temp_id));
            }
            Undo::ExamDeleted { index, schedule } => {
                let index = index.min(view.exam_schedules.len());
                view.exam_schedules.insert(index, schedule);
            }
            Undo::DocumentPatched { id, previous } => {
                if let Some(request) = view
                    .document_requests
                    .iter_mut()
                    .find(|request| request.id == Some(id))
                {
                    request.status = previous;
                    request.is_optimistic = false;
                }
            }
        }
    }
}
