//! Professor persona store: fixed teaching/grading profiles keyed by a
//! closed set of professor ids.
//!
//! The set is constructed once at process start and never mutated. Strictness
//! is validated into the 1..=10 range at construction; an out-of-range value
//! is a hard error, not a clamp.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The known professors. Adding a professor means adding a variant here and
/// a profile in `PersonaSet::builtin`; an unknown id cannot reach runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfessorId {
    Euclid,
    Turing,
    Goldwasser,
    Nakamoto,
}

impl ProfessorId {
    pub const ALL: [ProfessorId; 4] = [
        ProfessorId::Euclid,
        ProfessorId::Turing,
        ProfessorId::Goldwasser,
        ProfessorId::Nakamoto,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Euclid => "euclid",
            Self::Turing => "turing",
            Self::Goldwasser => "goldwasser",
            Self::Nakamoto => "nakamoto",
        }
    }
}

impl fmt::Display for ProfessorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProfessorId {
    type Err = PersonaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "euclid" => Ok(Self::Euclid),
            "turing" => Ok(Self::Turing),
            "goldwasser" => Ok(Self::Goldwasser),
            "nakamoto" => Ok(Self::Nakamoto),
            other => Err(PersonaError::UnknownProfessor(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum PersonaError {
    #[error("Unknown professor id \"{0}\". Known ids: euclid, turing, goldwasser, nakamoto")]
    UnknownProfessor(String),

    #[error("Persona \"{id}\" has strictness {strictness} — must be within 1..=10")]
    StrictnessOutOfRange { id: ProfessorId, strictness: u8 },
}

/// A fixed teaching and grading profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfessorPersona {
    pub id: ProfessorId,
    pub name: String,
    pub teaching_style: String,
    pub focus_areas: Vec<String>,
    /// 1 (accessible) through 10 (unforgiving).
    pub strictness: u8,
    pub grading_bias: String,
    pub lesson_tone: String,
    /// How this professor reframes a lesson after a student failure.
    pub failure_approach: String,
}

/// The immutable persona set. One profile per `ProfessorId`, validated at
/// construction.
#[derive(Debug, Clone)]
pub struct PersonaSet {
    euclid: ProfessorPersona,
    turing: ProfessorPersona,
    goldwasser: ProfessorPersona,
    nakamoto: ProfessorPersona,
}

impl PersonaSet {
    /// Assemble a set from one profile per professor, validating strictness.
    pub fn from_parts(
        euclid: ProfessorPersona,
        turing: ProfessorPersona,
        goldwasser: ProfessorPersona,
        nakamoto: ProfessorPersona,
    ) -> Result<Self, PersonaError> {
        for persona in [&euclid, &turing, &goldwasser, &nakamoto] {
            if !(1..=10).contains(&persona.strictness) {
                return Err(PersonaError::StrictnessOutOfRange {
                    id: persona.id,
                    strictness: persona.strictness,
                });
            }
        }
        Ok(Self {
            euclid,
            turing,
            goldwasser,
            nakamoto,
        })
    }

    /// The built-in faculty.
    pub fn builtin() -> Result<Self, PersonaError> {
        Self::from_parts(
            ProfessorPersona {
                id: ProfessorId::Euclid,
                name: "Professor Euclid".into(),
                teaching_style: "Axiomatic and proof-first. Every claim is derived from \
                                 definitions; nothing is asserted without justification."
                    .into(),
                focus_areas: vec![
                    "Finite fields and modular arithmetic".into(),
                    "Group theory foundations".into(),
                    "Proof technique and rigor".into(),
                ],
                strictness: 9,
                grading_bias: "Penalizes hand-waving and skipped derivation steps heavily. \
                               Partial credit only for work that is correct as far as it goes."
                    .into(),
                lesson_tone: "Formal, precise, sparing with motivation until the structure \
                              is established."
                    .into(),
                failure_approach: "Rebuild the argument from first principles with smaller \
                                   intermediate lemmas before reattempting the full derivation."
                    .into(),
            },
            ProfessorPersona {
                id: ProfessorId::Turing,
                name: "Professor Turing".into(),
                teaching_style: "Computation-driven. Concepts are introduced through \
                                 algorithms and worked machine-level examples."
                    .into(),
                focus_areas: vec![
                    "Symmetric primitives and block cipher modes".into(),
                    "Implementation correctness and edge cases".into(),
                    "Complexity and feasibility arguments".into(),
                ],
                strictness: 6,
                grading_bias: "Rewards working, well-tested implementations; docks points for \
                               unhandled edge cases more than for informal prose."
                    .into(),
                lesson_tone: "Pragmatic and example-heavy, with frequent checkpoints.".into(),
                failure_approach: "Decompose the failed problems into executable steps and \
                                   have the student trace each one concretely."
                    .into(),
            },
            ProfessorPersona {
                id: ProfessorId::Goldwasser,
                name: "Professor Goldwasser".into(),
                teaching_style: "Definition-and-game based. Security notions are stated as \
                                 precise games before any construction is shown."
                    .into(),
                focus_areas: vec![
                    "Provable security and reductions".into(),
                    "Public-key encryption and signatures".into(),
                    "Zero-knowledge and commitments".into(),
                ],
                strictness: 8,
                grading_bias: "Grades reductions on exactness: a security argument with an \
                               unquantified loss or a misdefined adversary earns little."
                    .into(),
                lesson_tone: "Exacting but generous with intuition once definitions are \
                              nailed down."
                    .into(),
                failure_approach: "Return to the security definition itself; most failures \
                                   come from attacking the wrong game."
                    .into(),
            },
            ProfessorPersona {
                id: ProfessorId::Nakamoto,
                name: "Professor Nakamoto".into(),
                teaching_style: "Adversary-first. Every mechanism is taught by asking how it \
                                 breaks under a motivated attacker with real incentives."
                    .into(),
                focus_areas: vec![
                    "Hash functions and commitment schemes".into(),
                    "Consensus and incentive design".into(),
                    "Practical protocol attacks".into(),
                ],
                strictness: 7,
                grading_bias: "Weighs the adversarial-analysis problems most; a clean break \
                               of the flawed protocol outweighs polish elsewhere."
                    .into(),
                lesson_tone: "Terse, concrete, attack-scenario driven.".into(),
                failure_approach: "Present a simpler broken variant of the same protocol and \
                                   have the student break that first."
                    .into(),
            },
        )
    }

    pub fn get(&self, id: ProfessorId) -> &ProfessorPersona {
        match id {
            ProfessorId::Euclid => &self.euclid,
            ProfessorId::Turing => &self.turing,
            ProfessorId::Goldwasser => &self.goldwasser,
            ProfessorId::Nakamoto => &self.nakamoto,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_covers_all_ids() {
        let set = PersonaSet::builtin().unwrap();
        for id in ProfessorId::ALL {
            let persona = set.get(id);
            assert_eq!(persona.id, id);
            assert!((1..=10).contains(&persona.strictness));
            assert!(!persona.focus_areas.is_empty());
        }
    }

    #[test]
    fn test_strictness_out_of_range_rejected() {
        let set = PersonaSet::builtin().unwrap();
        let mut bad = set.get(ProfessorId::Turing).clone();
        bad.strictness = 11;
        let err = PersonaSet::from_parts(
            set.get(ProfessorId::Euclid).clone(),
            bad,
            set.get(ProfessorId::Goldwasser).clone(),
            set.get(ProfessorId::Nakamoto).clone(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PersonaError::StrictnessOutOfRange {
                id: ProfessorId::Turing,
                strictness: 11
            }
        ));
    }

    #[test]
    fn test_zero_strictness_rejected() {
        let set = PersonaSet::builtin().unwrap();
        let mut bad = set.get(ProfessorId::Euclid).clone();
        bad.strictness = 0;
        assert!(PersonaSet::from_parts(
            bad,
            set.get(ProfessorId::Turing).clone(),
            set.get(ProfessorId::Goldwasser).clone(),
            set.get(ProfessorId::Nakamoto).clone(),
        )
        .is_err());
    }

    #[test]
    fn test_professor_id_round_trip() {
        for id in ProfessorId::ALL {
            let parsed: ProfessorId = id.as_str().parse().unwrap();
            assert_eq!(parsed, id);
        }
    }

    #[test]
    fn test_unknown_professor_id() {
        let err = "gauss".parse::<ProfessorId>().unwrap_err();
        assert!(err.to_string().contains("gauss"));
    }

    #[test]
    fn test_professor_id_serde_lowercase() {
        let json = serde_json::to_string(&ProfessorId::Goldwasser).unwrap();
        assert_eq!(json, "\"goldwasser\"");
        let back: ProfessorId = serde_json::from_str("\"euclid\"").unwrap();
        assert_eq!(back, ProfessorId::Euclid);
    }
}
