//! Davies' algorithm for the distribution of a linear combination of
//! independent non-central chi-squared variables plus a normal term.
//!
//! Reference: R. B. Davies (1980), "Algorithm AS 155: The Distribution of
//! a Linear Combination of chi-squared Random Variables", Applied
//! Statistics 29, 323-333.
//!
//! All working state lives in a per-call [`Qf`], so concurrent calls are
//! independent.

use std::f64::consts::PI;

/// ln(2) / 8.
const LOG28: f64 = 0.0866;

/// Why a Davies evaluation is unreliable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaviesFault {
    /// Required accuracy not achieved within the term limit.
    AccuracyNotAchieved,
    /// Round-off error possibly significant.
    RoundOff,
    /// Negative non-centrality or a degenerate combination.
    InvalidParameters,
    /// Term limit exhausted while locating integration parameters.
    NoIntegrationParameters,
}

impl DaviesFault {
    /// Numeric fault code of the reference algorithm.
    pub fn code(self) -> u8 {
        match self {
            DaviesFault::AccuracyNotAchieved => 1,
            DaviesFault::RoundOff => 2,
            DaviesFault::InvalidParameters => 3,
            DaviesFault::NoIntegrationParameters => 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DaviesResult {
    /// P(Q < c); -1 when no value could be computed.
    pub cdf: f64,
    pub fault: Option<DaviesFault>,
    /// Absolute error sum, total terms, integrations, final interval,
    /// initial truncation point, convergence factor s.d., cycles.
    pub trace: [f64; 7],
}

/// Term budget exhausted.
struct LimitReached;

type Step<T> = Result<T, LimitReached>;

/// P(sum_j lambda_j X_j + sigma Z < c), X_j ~ chi2(df_j, nc_j).
pub fn qfc(
    lambda: &[f64],
    nc: &[f64],
    df: &[u32],
    sigma: f64,
    c: f64,
    lim: usize,
    acc: f64,
) -> DaviesResult {
    assert_eq!(lambda.len(), nc.len());
    assert_eq!(lambda.len(), df.len());
    let mut qf = Qf {
        lb: lambda,
        nc,
        n: df,
        sigsq: 0.0,
        lmax: 0.0,
        lmin: 0.0,
        mean: 0.0,
        c,
        intl: 0.0,
        ersm: 0.0,
        count: 0,
        lim,
        th: Vec::new(),
        sorted: false,
        fail: false,
    };
    let mut trace = [0.0; 7];
    let (cdf, fault) = match qf.run(sigma, acc, &mut trace) {
        Ok(out) => out,
        Err(LimitReached) => (-1.0, Some(DaviesFault::NoIntegrationParameters)),
    };
    trace[6] = qf.count as f64;
    DaviesResult { cdf, fault, trace }
}

/// Upper tail of a central chi-squared mixture with unit degrees of
/// freedom: P(sum_j lambda_j chi2_1 > q).
pub fn chisq_mixture_upper(lambda: &[f64], q: f64, lim: usize, acc: f64) -> DaviesResult {
    let nc = vec![0.0; lambda.len()];
    let df = vec![1u32; lambda.len()];
    let mut res = qfc(lambda, &nc, &df, 0.0, q, lim, acc);
    if res.cdf >= 0.0 {
        res.cdf = 1.0 - res.cdf;
    }
    res
}

fn exp1(x: f64) -> f64 {
    if x < -50.0 {
        0.0
    } else {
        x.exp()
    }
}

/// ln(1 + x) when `first`, else ln(1 + x) - x; series for small |x|.
fn log1(x: f64, first: bool) -> f64 {
    if x.abs() > 0.1 {
        if first {
            x.ln_1p()
        } else {
            x.ln_1p() - x
        }
    } else {
        let mut y = x / (2.0 + x);
        let mut term = 2.0 * y * y * y;
        let mut k = 3.0;
        let mut s = (if first { 2.0 } else { -x }) * y;
        y *= y;
        let mut s1 = s + term / k;
        while s1 != s {
            k += 2.0;
            term *= y;
            s = s1;
            s1 = s + term / k;
        }
        s
    }
}

struct Qf<'a> {
    lb: &'a [f64],
    nc: &'a [f64],
    n: &'a [u32],
    sigsq: f64,
    lmax: f64,
    lmin: f64,
    mean: f64,
    c: f64,
    intl: f64,
    ersm: f64,
    count: usize,
    lim: usize,
    /// Indices of `lb` by decreasing |lb|.
    th: Vec<usize>,
    sorted: bool,
    fail: bool,
}

impl Qf<'_> {
    fn r(&self) -> usize {
        self.lb.len()
    }

    fn nj(&self, j: usize) -> f64 {
        f64::from(self.n[j])
    }

    fn counter(&mut self) -> Step<()> {
        self.count += 1;
        if self.count > self.lim {
            Err(LimitReached)
        } else {
            Ok(())
        }
    }

    fn order(&mut self) {
        let r = self.r();
        self.th = vec![0; r];
        for j in 0..r {
            let lj = self.lb[j].abs();
            let mut k = j;
            while k > 0 && lj > self.lb[self.th[k - 1]].abs() {
                self.th[k] = self.th[k - 1];
                k -= 1;
            }
            self.th[k] = j;
        }
        self.sorted = true;
    }

    /// Tail bound from the mgf at `u`, with the matching cutoff.
    fn errbd(&mut self, u: f64) -> Step<(f64, f64)> {
        self.counter()?;
        let mut xconst = u * self.sigsq;
        let mut sum1 = u * xconst;
        let u = 2.0 * u;
        for j in (0..self.r()).rev() {
            let nj = self.nj(j);
            let lj = self.lb[j];
            let ncj = self.nc[j];
            let x = u * lj;
            let y = 1.0 - x;
            xconst += lj * (ncj / y + nj) / y;
            sum1 += ncj * (x / y).powi(2) + nj * (x * x / y + log1(-x, false));
        }
        Ok((exp1(-0.5 * sum1), xconst))
    }

    /// Cutoff beyond which the tail holds less than `accx`.
    fn ctff(&mut self, accx: f64, upn: &mut f64) -> Step<f64> {
        let mut u2 = *upn;
        let mut u1 = 0.0;
        let mut c1 = self.mean;
        let rb = 2.0 * if u2 > 0.0 { self.lmax } else { self.lmin };
        let mut c2;
        loop {
            let (bound, cx) = self.errbd(u2 / (1.0 + u2 * rb))?;
            c2 = cx;
            if bound <= accx {
                break;
            }
            u1 = u2;
            c1 = c2;
            u2 *= 2.0;
        }
        let mut u = (c1 - self.mean) / (c2 - self.mean);
        while u < 0.9 {
            u = (u1 + u2) / 2.0;
            let (bound, xconst) = self.errbd(u / (1.0 + u * rb))?;
            if bound > accx {
                u1 = u;
                c1 = xconst;
            } else {
                u2 = u;
                c2 = xconst;
            }
            u = (c1 - self.mean) / (c2 - self.mean);
        }
        *upn = u2;
        Ok(c2)
    }

    /// Bound on the integration error from truncating at `u`.
    fn truncation(&mut self, u: f64, tausq: f64) -> Step<f64> {
        self.counter()?;
        let mut sum1 = 0.0;
        let mut prod2 = 0.0;
        let mut prod3 = 0.0;
        let mut s = 0.0;
        let sum2 = (self.sigsq + tausq) * u * u;
        let mut prod1 = 2.0 * sum2;
        let u = 2.0 * u;
        for j in 0..self.r() {
            let lj = self.lb[j];
            let ncj = self.nc[j];
            let nj = self.nj(j);
            let x = (u * lj).powi(2);
            sum1 += ncj * x / (1.0 + x);
            if x > 1.0 {
                prod2 += nj * x.ln();
                prod3 += nj * log1(x, true);
                s += nj;
            } else {
                prod1 += nj * log1(x, true);
            }
        }
        sum1 *= 0.5;
        prod2 += prod1;
        prod3 += prod1;
        let x = exp1(-sum1 - 0.25 * prod2) / PI;
        let y = exp1(-sum1 - 0.25 * prod3) / PI;
        let mut err1 = if s == 0.0 { 1.0 } else { x * 2.0 / s };
        let err2 = if prod3 > 1.0 { 2.5 * y } else { 1.0 };
        if err2 < err1 {
            err1 = err2;
        }
        let x = 0.5 * sum2;
        let err2 = if x <= y { 1.0 } else { y / x };
        Ok(err1.min(err2))
    }

    /// Smallest convenient u with truncation(u) below `accx`.
    fn findu(&mut self, utx: &mut f64, accx: f64) -> Step<()> {
        const DIVIS: [f64; 4] = [2.0, 1.4, 1.2, 1.1];
        let mut ut = *utx;
        let mut u = ut / 4.0;
        if self.truncation(u, 0.0)? > accx {
            u = ut;
            while self.truncation(u, 0.0)? > accx {
                ut *= 4.0;
                u = ut;
            }
        } else {
            ut = u;
            u /= 4.0;
            while self.truncation(u, 0.0)? <= accx {
                ut = u;
                u /= 4.0;
            }
        }
        for d in DIVIS {
            u = ut / d;
            if self.truncation(u, 0.0)? <= accx {
                ut = u;
            }
        }
        *utx = ut;
        Ok(())
    }

    /// Integrate with `nterm` terms at step `interv`. Auxiliary passes
    /// multiply the integrand by 1 - exp(-tausq u^2 / 2).
    fn integrate(&mut self, nterm: usize, interv: f64, tausq: f64, main: bool) {
        let inpi = interv / PI;
        for k in (0..=nterm).rev() {
            let u = (k as f64 + 0.5) * interv;
            let mut sum1 = -2.0 * u * self.c;
            let mut sum2 = sum1.abs();
            let mut sum3 = -0.5 * self.sigsq * u * u;
            for j in (0..self.r()).rev() {
                let nj = self.nj(j);
                let x = 2.0 * self.lb[j] * u;
                let y = x * x;
                sum3 -= 0.25 * nj * log1(y, true);
                let y = self.nc[j] * x / (1.0 + y);
                let z = nj * x.atan() + y;
                sum1 += z;
                sum2 += z.abs();
                sum3 -= 0.5 * x * y;
            }
            let mut x = inpi * exp1(sum3) / u;
            if !main {
                x *= 1.0 - exp1(-0.5 * tausq * u * u);
            }
            self.intl += (0.5 * sum1).sin() * x;
            self.ersm += 0.5 * sum2 * x;
        }
    }

    /// Coefficient of tausq in the error of the convergence factor at `x`.
    fn cfe(&mut self, x: f64) -> Step<f64> {
        self.counter()?;
        if !self.sorted {
            self.order();
        }
        let mut axl = x.abs();
        let sxl = if x > 0.0 { 1.0 } else { -1.0 };
        let mut sum1 = 0.0;
        for j in (0..self.r()).rev() {
            let t = self.th[j];
            if self.lb[t] * sxl > 0.0 {
                let lj = self.lb[t].abs();
                let axl1 = axl - lj * (self.nj(t) + self.nc[t]);
                let axl2 = lj / LOG28;
                if axl1 > axl2 {
                    axl = axl1;
                } else {
                    if axl > axl2 {
                        axl = axl2;
                    }
                    sum1 = (axl - axl1) / lj;
                    for k in (0..j).rev() {
                        let tk = self.th[k];
                        sum1 += self.nj(tk) + self.nc[tk];
                    }
                    break;
                }
            }
        }
        if sum1 > 100.0 {
            self.fail = true;
            Ok(1.0)
        } else {
            Ok(2f64.powf(sum1 / 4.0) / (PI * axl * axl))
        }
    }

    fn run(
        &mut self,
        sigma: f64,
        acc: f64,
        trace: &mut [f64; 7],
    ) -> Step<(f64, Option<DaviesFault>)> {
        let mut acc1 = acc;
        let mut xlim = self.lim as f64;
        let c = self.c;

        self.sigsq = sigma * sigma;
        let mut sd = self.sigsq;
        for j in 0..self.r() {
            let nj = self.nj(j);
            let lj = self.lb[j];
            let ncj = self.nc[j];
            if ncj < 0.0 {
                return Ok((-1.0, Some(DaviesFault::InvalidParameters)));
            }
            sd += lj * lj * (2.0 * nj + 4.0 * ncj);
            self.mean += lj * (nj + ncj);
            if self.lmax < lj {
                self.lmax = lj;
            } else if self.lmin > lj {
                self.lmin = lj;
            }
        }
        if sd == 0.0 {
            return Ok((if c > 0.0 { 1.0 } else { 0.0 }, None));
        }
        if self.lmin == 0.0 && self.lmax == 0.0 && sigma == 0.0 {
            return Ok((-1.0, Some(DaviesFault::InvalidParameters)));
        }
        let sd = sd.sqrt();
        let almx = self.lmax.max(-self.lmin);

        let mut utx = 16.0 / sd;
        let mut up = 4.5 / sd;
        let mut un = -up;
        self.findu(&mut utx, 0.5 * acc1)?;
        if c != 0.0 && almx > 0.07 * sd {
            let tausq = 0.25 * acc1 / self.cfe(c)?;
            if self.fail {
                self.fail = false;
            } else if self.truncation(utx, tausq)? < 0.2 * acc1 {
                self.sigsq += tausq;
                self.findu(&mut utx, 0.25 * acc1)?;
                trace[5] = tausq.sqrt();
            }
        }
        trace[4] = utx;
        acc1 *= 0.5;

        loop {
            let d1 = self.ctff(acc1, &mut up)? - c;
            if d1 < 0.0 {
                return Ok((1.0, None));
            }
            let d2 = c - self.ctff(acc1, &mut un)?;
            if d2 < 0.0 {
                return Ok((0.0, None));
            }
            let intv = 2.0 * PI / d1.max(d2);
            let xnt = utx / intv;
            let xntm = 3.0 / acc1.sqrt();

            if xnt > xntm * 1.5 {
                if xntm > xlim {
                    return Ok((-1.0, Some(DaviesFault::AccuracyNotAchieved)));
                }
                let ntm = (xntm + 0.5).floor() as usize;
                let intv1 = utx / ntm as f64;
                let x = 2.0 * PI / intv1;
                if x > c.abs() {
                    let lo = self.cfe(c - x)?;
                    let hi = self.cfe(c + x)?;
                    let tausq = 0.33 * acc1 / (1.1 * (lo + hi));
                    if !self.fail {
                        acc1 *= 0.67;
                        self.integrate(ntm, intv1, tausq, false);
                        xlim -= xntm;
                        self.sigsq += tausq;
                        trace[2] += 1.0;
                        trace[1] += (ntm + 1) as f64;
                        self.findu(&mut utx, 0.25 * acc1)?;
                        acc1 *= 0.75;
                        continue;
                    }
                }
            }

            trace[3] = intv;
            if xnt > xlim {
                return Ok((-1.0, Some(DaviesFault::AccuracyNotAchieved)));
            }
            let nt = (xnt + 0.5).floor() as usize;
            self.integrate(nt, intv, 0.0, true);
            trace[2] += 1.0;
            trace[1] += (nt + 1) as f64;
            trace[0] = self.ersm;

            return Ok((0.5 - self.intl, round_off_fault(self.ersm, acc)));
        }
    }
}

/// Fault 2 when a tenth of the requested accuracy no longer registers
/// against the integration error bound `ersm`.
fn round_off_fault(ersm: f64, acc: f64) -> Option<DaviesFault> {
    let x = ersm + acc / 10.0;
    [1.0, 2.0, 4.0, 8.0]
        .iter()
        .any(|r| r * x == r * ersm)
        .then_some(DaviesFault::RoundOff)
}
