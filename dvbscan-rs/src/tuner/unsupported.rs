use dvbscan_si::DeliveryKind;

use super::{Frontend, Lnb};
use crate::error::TunerError;
use crate::model::Transponder;

pub struct LinuxFrontend {
    _private: (),
}

impl LinuxFrontend {
    pub fn open(
        _adapter: u32,
        _frontend: u32,
        _read_only: bool,
        _lnb: Lnb,
    ) -> Result<Self, TunerError> {
        Err(TunerError::Unsupported)
    }

    pub fn can_inversion_auto(&self) -> bool {
        false
    }
}

impl Frontend for LinuxFrontend {
    fn kind(&self) -> DeliveryKind {
        DeliveryKind::Terrestrial
    }

    fn set_frontend(&mut self, _tp: &Transponder) -> Result<(), TunerError> {
        Err(TunerError::Unsupported)
    }

    fn has_lock(&mut self) -> Result<bool, TunerError> {
        Err(TunerError::Unsupported)
    }
}
