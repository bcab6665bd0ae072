use crate::dimensions::{DMatrix, DVector};
use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};
use std::fmt;

/// Stores a track estimate, as the result of a time update or a measurement
/// update, in a CSV-serializable form: the time tag, the state vector and
/// the variance of each state component.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackEstimate {
    /// Time of this estimate (s)
    pub t: f64,
    /// State estimate
    pub state: DVector<f64>,
    /// Error covariance
    pub covar: DMatrix<f64>,
    /// Whether this estimate came from a time update (no measurement)
    pub predicted: bool,
}

impl TrackEstimate {
    /// An empty estimate, useful for storing an estimate outside the scope of
    /// a filtering loop.
    pub fn zeros(dim: usize) -> Self {
        Self {
            t: 0.0,
            state: DVector::zeros(dim),
            covar: DMatrix::zeros(dim, dim),
            predicted: true,
        }
    }

    pub fn new(t: f64, state: DVector<f64>, covar: DMatrix<f64>, predicted: bool) -> Self {
        Self {
            t,
            state,
            covar,
            predicted,
        }
    }

    pub fn header(dim: usize) -> Vec<String> {
        let mut hdr_v = Vec::with_capacity(2 * dim + 2);
        hdr_v.push("time".to_string());
        for i in 0..dim {
            hdr_v.push(format!("state_{}", i));
        }
        for i in 0..dim {
            hdr_v.push(format!("covar_{}_{}", i, i));
        }
        hdr_v.push("predicted".to_string());
        hdr_v
    }
}

impl fmt::Display for TrackEstimate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "t = {}, state = {}", self.t, &self.state)
    }
}

impl Serialize for TrackEstimate {
    fn serialize<O>(&self, serializer: O) -> Result<O::Ok, O::Error>
    where
        O: Serializer,
    {
        let dim = self.state.len();
        let mut seq = serializer.serialize_seq(Some(2 * dim + 2))?;
        seq.serialize_element(&self.t)?;
        for i in 0..dim {
            seq.serialize_element(&self.state[i])?;
        }
        for i in 0..dim {
            seq.serialize_element(&self.covar[(i, i)])?;
        }
        seq.serialize_element(&self.predicted)?;
        seq.end()
    }
}

/// Stores the prefit and postfit residuals of a measurement update.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackResidual {
    /// Time of this residual (s)
    pub t: f64,
    /// The residual before the state update
    pub prefit: DVector<f64>,
    /// The residual after the state update
    pub postfit: DVector<f64>,
}

impl TrackResidual {
    pub fn zeros(dim: usize) -> Self {
        Self {
            t: 0.0,
            prefit: DVector::zeros(dim),
            postfit: DVector::zeros(dim),
        }
    }

    pub fn new(t: f64, prefit: DVector<f64>, postfit: DVector<f64>) -> Self {
        Self { t, prefit, postfit }
    }

    pub fn header(dim: usize) -> Vec<String> {
        let mut hdr_v = Vec::with_capacity(2 * dim + 1);
        hdr_v.push("time".to_string());
        for i in 0..dim {
            hdr_v.push(format!("prefit_{}", i));
        }
        for i in 0..dim {
            hdr_v.push(format!("postfit_{}", i));
        }
        hdr_v
    }
}

impl fmt::Display for TrackResidual {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "prefit {} postfit {}", &self.prefit, &self.postfit)
    }
}

impl Serialize for TrackResidual {
    fn serialize<O>(&self, serializer: O) -> Result<O::Ok, O::Error>
    where
        O: Serializer,
    {
        let dim = self.prefit.len();
        let mut seq = serializer.serialize_seq(Some(2 * dim + 1))?;
        seq.serialize_element(&self.t)?;
        for i in 0..dim {
            seq.serialize_element(&self.prefit[i])?;
        }
        for i in 0..dim {
            seq.serialize_element(&self.postfit[i])?;
        }
        seq.end()
    }
}
