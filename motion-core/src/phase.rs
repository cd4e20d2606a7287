/// Session phases, in the order a participant goes through them.
#[derive(Copy, Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Calibration,
    Practice,
    Staircase,
    Debrief,
}

impl SessionPhase {
    pub fn next(&self) -> Option<Self> {
        use SessionPhase::*;
        Some(match self {
            Calibration => Practice,
            Practice => Staircase,
            Staircase => Debrief,
            Debrief => return None,
        })
    }

    pub fn is_practice(&self) -> bool {
        matches!(self, SessionPhase::Practice)
    }
}
