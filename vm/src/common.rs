use strum_macros::{Display, EnumIter};

pub type Cycle = usize;

/// Marker recorded for an instruction in a given clock cycle
#[derive(Debug, Clone, Copy, Eq, PartialEq, PartialOrd, Ord, Hash, Default, Display, EnumIter)]
pub enum Stage {
    #[default]
    Empty, // not yet fetched, or already retired
    Fetch,
    Decode,
    Execute,
    Memory,
    WriteBack,
    Bubble, // slot held by a nop or a squashed instruction
}

impl Stage {
    /// Returns the stage following `self` in the fixed IF->ID->EX->MEM->WB
    /// order, or `None` past write-back and for the bookkeeping markers
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Fetch => Some(Stage::Decode),
            Stage::Decode => Some(Stage::Execute),
            Stage::Execute => Some(Stage::Memory),
            Stage::Memory => Some(Stage::WriteBack),
            Stage::WriteBack | Stage::Empty | Stage::Bubble => None,
        }
    }

    /// Whether this marker is one of the five real pipeline stages
    pub fn is_pipeline_stage(self) -> bool {
        !matches!(self, Stage::Empty | Stage::Bubble)
    }

    /// Number of stage transitions needed to get from `self` to `later`.
    /// Zero if `later` is not ahead of `self`
    pub fn distance_to(self, later: Stage) -> usize {
        let mut steps = 0;
        let mut curr = self;
        while curr != later {
            match curr.next() {
                Some(next) => {
                    curr = next;
                    steps += 1;
                }
                None => return 0,
            }
        }
        steps
    }

    /// Symbol used when rendering the pipeline diagram
    pub fn symbol(self) -> &'static str {
        match self {
            Stage::Empty => ".",
            Stage::Fetch => "IF",
            Stage::Decode => "ID",
            Stage::Execute => "EX",
            Stage::Memory => "MEM",
            Stage::WriteBack => "WB",
            Stage::Bubble => "*",
        }
    }
}
