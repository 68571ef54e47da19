//! Ready-made relationships and content for scenario tests.

use quietbox_core::{
    CoreError, EnvRng, Environment, Granularity, JoinRequest, JoinSubmission, Shareable,
    ShareableKind, Study,
};
use quietbox_crypto::{KeyAgreement, KeySet, Role, expand};

/// Run a key agreement between two fresh parties and expand both ends.
///
/// Returns `(initiator, responder)`.
///
/// # Errors
///
/// Only if the agreement rejects a freshly generated public value.
pub fn establish_relationship<E: Environment>(env: &E) -> Result<(KeySet, KeySet), CoreError> {
    let mut rng = EnvRng::new(env);
    let mut alice = KeyAgreement::generate(&mut rng);
    let mut bob = KeyAgreement::generate(&mut rng);

    alice.accept_share(&bob.public_share())?;
    bob.accept_share(&alice.public_share())?;

    Ok((expand(alice.shared_secret()?, Role::Initiator), expand(bob.shared_secret()?, Role::Responder)))
}

/// Prepare a join request for `study` as a new participant.
///
/// Returns the submission for the researcher and the participant's key set.
pub fn join<E: Environment>(
    study: &Study,
    env: &E,
    sequence: u32,
) -> Result<(JoinSubmission, KeySet), CoreError> {
    let (sealed, key_set) = JoinRequest::prepare(&study.invitation()?, sequence, env)?;
    Ok((JoinSubmission { sealed, expected_sequence: Some(sequence) }, key_set))
}

/// Distinct content item number `n`.
pub fn sample_item(n: u8) -> Shareable {
    Shareable::new(ShareableKind::StepCount, Granularity::Coarse, format!("day {n}"), vec![n; 48])
}
