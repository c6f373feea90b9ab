// ── Enumeration steps ──
//
// Steps run strictly one at a time, in `STEP_ORDER`. A step stays in the
// pending set until all its queries are answered; a later step may be
// added while an earlier one runs (a cache hit adds
// `GetDescriptorDynamicInfo` from inside `GetStaticModel`).

use serde::{Deserialize, Serialize};
use strum::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum EnumerationStep {
    GetMilanInfo,
    RegisterUnsol,
    CheckPackedDynamicInfoSupported,
    GetStaticModel,
    GetDescriptorDynamicInfo,
    GetDynamicInfo,
}

/// Execution order of the steps.
pub const STEP_ORDER: [EnumerationStep; 6] = [
    EnumerationStep::GetMilanInfo,
    EnumerationStep::RegisterUnsol,
    EnumerationStep::CheckPackedDynamicInfoSupported,
    EnumerationStep::GetStaticModel,
    EnumerationStep::GetDescriptorDynamicInfo,
    EnumerationStep::GetDynamicInfo,
];

impl EnumerationStep {
    const fn bit(self) -> u8 {
        match self {
            Self::GetMilanInfo => 0x01,
            Self::RegisterUnsol => 0x02,
            Self::CheckPackedDynamicInfoSupported => 0x04,
            Self::GetStaticModel => 0x08,
            Self::GetDescriptorDynamicInfo => 0x10,
            Self::GetDynamicInfo => 0x20,
        }
    }
}

/// Set of steps still to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnumerationSteps(u8);

impl EnumerationSteps {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, step: EnumerationStep) -> bool {
        self.0 & step.bit() != 0
    }

    pub fn insert(&mut self, step: EnumerationStep) {
        self.0 |= step.bit();
    }

    pub fn remove(&mut self, step: EnumerationStep) {
        self.0 &= !step.bit();
    }

    /// Highest-priority step still pending.
    pub fn next(self) -> Option<EnumerationStep> {
        STEP_ORDER.into_iter().find(|step| self.contains(*step))
    }

    pub fn iter(self) -> impl Iterator<Item = EnumerationStep> {
        STEP_ORDER.into_iter().filter(move |step| self.contains(*step))
    }
}

impl FromIterator<EnumerationStep> for EnumerationSteps {
    fn from_iter<I: IntoIterator<Item = EnumerationStep>>(iter: I) -> Self {
        let mut steps = Self::empty();
        for step in iter {
            steps.insert(step);
        }
        steps
    }
}
