use std::ops::Range;

use typed_index_collections::TiSlice;

use crate::lp::{LinearProgram, LpError, VarId};

type Result<T> = std::result::Result<T, LpError>;

/// Allocates one variable per index of a (possibly multi-dimensional) index space
pub trait AddVars {
    type Out;

    /// Create a variable with a closure
    fn vars_with<F: FnMut(Self) -> Result<VarId>>(&self, func: F) -> Result<Self::Out>
    where
        Self: Sized;

    /// Create a continuous variable with the given bounds for every index, named by `name`
    fn vars<N: Fn(Self) -> String>(
        &self,
        lp: &mut LinearProgram,
        name: N,
        bounds: &Range<f64>,
    ) -> Result<Self::Out>
    where
        Self: Sized,
    {
        self.vars_with(|index| lp.add_var(&name(index), bounds))
    }

    /// A continuous non-negative variable
    fn cont<N: Fn(Self) -> String>(&self, lp: &mut LinearProgram, name: N) -> Result<Self::Out>
    where
        Self: Sized,
    {
        self.vars(lp, name, &(0.0..f64::INFINITY))
    }
}

impl AddVars for usize {
    type Out = Vec<VarId>;

    fn vars_with<F: FnMut(Self) -> Result<VarId>>(&self, mut func: F) -> Result<Self::Out>
    where
        Self: Sized,
    {
        let mut vec = Vec::with_capacity(*self);
        for i in 0..*self {
            vec.push(func(i)?);
        }

        Ok(vec)
    }
}

impl AddVars for (usize, usize) {
    type Out = Vec<<usize as AddVars>::Out>;

    fn vars_with<F: FnMut(Self) -> Result<VarId>>(&self, mut func: F) -> Result<Self::Out>
    where
        Self: Sized,
    {
        let mut out = Vec::with_capacity(self.0);
        for i in 0..self.0 {
            out.push(self.1.vars_with(|j| func((i, j)))?);
        }

        Ok(out)
    }
}

impl AddVars for (usize, usize, usize) {
    type Out = Vec<<(usize, usize) as AddVars>::Out>;

    fn vars_with<F: FnMut(Self) -> Result<VarId>>(&self, mut func: F) -> Result<Self::Out>
    where
        Self: Sized,
    {
        let mut out = Vec::with_capacity(self.0);
        for i in 0..self.0 {
            out.push((self.1, self.2).vars_with(|(j, k)| func((i, j, k)))?)
        }

        Ok(out)
    }
}

/// Trait that converts variables to their values in a solution
pub trait ConvertVars {
    type Out;
    fn convert(&self, values: &TiSlice<VarId, f64>) -> Self::Out;
}

impl<T: ConvertVars> ConvertVars for Vec<T> {
    type Out = Vec<T::Out>;

    fn convert(&self, values: &TiSlice<VarId, f64>) -> Self::Out {
        self.iter().map(|e| e.convert(values)).collect()
    }
}

impl ConvertVars for VarId {
    type Out = f64;

    fn convert(&self, values: &TiSlice<VarId, f64>) -> Self::Out {
        values[*self]
    }
}
