//! The eligibility engine: given a party and an attachment, decide whether
//! the party may sign now.
//!
//! Everything here is pure and read-only; it performs no I/O, never blocks
//! and may run with unbounded parallelism. Ineligibility is a normal outcome
//! carried by [`Eligibility::Denied`], never an `Err` — errors are reserved
//! for malformed requirement groups.

use std::collections::HashMap;

use crate::{
    error::{Result, ResolverError},
    types::{
        Attachment, AttachmentId, DenialReason, Eligibility, Party, SignatureRecord,
        SignatureRequirement, SigningMode, StepDefinitionId,
    },
};

/// Requirements applicable to an attachment: those naming it directly plus
/// the deprecated step-wide wildcards, which fan out into one independent
/// chain per attachment.
pub fn applicable_requirements(
    attachment_id: AttachmentId,
    requirements: &[SignatureRequirement],
) -> Vec<&SignatureRequirement> {
    requirements
        .iter()
        .filter(|r| r.applies_to(attachment_id))
        .collect()
}

/// True when every required requirement applicable to the attachment has at
/// least one COMPLETED record; optional requirements never block. This is the
/// definition the cached `is_signed` flag must always agree with.
///
/// A group with no required requirements never completes on its own: optional
/// signatures accumulate but do not close the attachment.
pub fn is_fully_signed(
    attachment_id: AttachmentId,
    requirements: &[SignatureRequirement],
    records: &[SignatureRecord],
) -> bool {
    let required: Vec<&SignatureRequirement> =
        applicable_requirements(attachment_id, requirements)
            .into_iter()
            .filter(|r| r.is_required)
            .collect();
    if required.is_empty() {
        return false;
    }
    required
        .iter()
        .all(|req| has_completed_record(req, attachment_id, records))
}

/// May `party` sign `attachment_id` right now?
pub fn can_sign(
    party: &Party,
    attachment_id: AttachmentId,
    requirements: &[SignatureRequirement],
    records: &[SignatureRecord],
) -> Result<Eligibility> {
    let group = applicable_requirements(attachment_id, requirements);
    validate_group(&group)?;

    if is_fully_signed(attachment_id, requirements, records) {
        return Ok(Eligibility::Denied(DenialReason::AlreadySigned));
    }

    // Direct user match outranks sector membership; a party named at several
    // chain positions targets its lowest still-open one.
    let Some(requirement) = match_requirement(party, attachment_id, &group, records) else {
        let signed_by_party = records.iter().any(|record| {
            record.attachment_id == attachment_id
                && record.signer_id == party.user_id
                && record.is_completed()
                && group.iter().any(|r| r.id == record.requirement_id)
        });
        return if signed_by_party {
            Ok(Eligibility::Denied(DenialReason::AlreadySignedByYou))
        } else {
            Ok(Eligibility::Denied(DenialReason::NotResponsible))
        };
    };

    if requirement.mode == SigningMode::Parallel {
        return Ok(Eligibility::Eligible {
            requirement_id: requirement.id,
        });
    }

    // Only required predecessors gate the chain; an unsigned optional
    // requirement must not be able to hold an attachment open forever.
    let open_predecessors = group
        .iter()
        .filter(|r| r.is_required && r.order < requirement.order)
        .filter(|r| !has_completed_record(r, attachment_id, records))
        .count();
    if open_predecessors > 0 {
        return Ok(Eligibility::Denied(DenialReason::WaitingOnPredecessors(
            open_predecessors,
        )));
    }

    Ok(Eligibility::Eligible {
        requirement_id: requirement.id,
    })
}

/// The attachments a party can act on right now: the union of `can_sign`
/// over every open attachment they are named on, directly or via sector.
pub fn list_pending_work<'a>(
    party: &Party,
    open_attachments: &'a [Attachment],
    requirements_by_step: &HashMap<StepDefinitionId, Vec<SignatureRequirement>>,
    records_by_attachment: &HashMap<AttachmentId, Vec<SignatureRecord>>,
) -> Result<Vec<&'a Attachment>> {
    let empty_requirements: Vec<SignatureRequirement> = Vec::new();
    let empty_records: Vec<SignatureRecord> = Vec::new();

    let mut actionable = Vec::new();
    for attachment in open_attachments {
        let requirements = requirements_by_step
            .get(&attachment.step_definition_id)
            .unwrap_or(&empty_requirements);
        let records = records_by_attachment
            .get(&attachment.id)
            .unwrap_or(&empty_records);
        if can_sign(party, attachment.id, requirements, records)?.is_eligible() {
            actionable.push(attachment);
        }
    }
    Ok(actionable)
}

/// Uniform mode across the group; unique orders when sequential.
fn validate_group(group: &[&SignatureRequirement]) -> Result<()> {
    if group
        .windows(2)
        .any(|pair| pair[0].mode != pair[1].mode)
    {
        return Err(ResolverError::MixedModes.into());
    }
    if group.first().map(|r| r.mode) == Some(SigningMode::Sequential) {
        let mut orders: Vec<i32> = group.iter().map(|r| r.order).collect();
        orders.sort_unstable();
        if let Some(duplicate) = orders.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(ResolverError::DuplicateOrder(duplicate[0]).into());
        }
    }
    Ok(())
}

fn has_completed_record(
    requirement: &SignatureRequirement,
    attachment_id: AttachmentId,
    records: &[SignatureRecord],
) -> bool {
    records.iter().any(|record| {
        record.requirement_id == requirement.id
            && record.attachment_id == attachment_id
            && record.is_completed()
    })
}

/// The requirement this party should act on: direct user matches first, then
/// sector matches, lowest order first, skipping requirements that already
/// carry a completed record (a sector colleague's signature consumes the
/// requirement for the whole sector).
fn match_requirement<'a>(
    party: &Party,
    attachment_id: AttachmentId,
    group: &[&'a SignatureRequirement],
    records: &[SignatureRecord],
) -> Option<&'a SignatureRequirement> {
    let mut candidates: Vec<&&'a SignatureRequirement> = group
        .iter()
        .filter(|r| party.satisfies(&r.responsible))
        .collect();
    candidates.sort_by_key(|r| {
        let sector_match = matches!(r.responsible, crate::types::ResponsibleParty::Sector(_));
        (sector_match, r.order)
    });
    candidates
        .into_iter()
        .find(|req| !has_completed_record(req, attachment_id, records))
        .copied()
}
