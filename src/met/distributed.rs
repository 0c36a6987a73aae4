//! Client/server distribution of a meteorological source.
//!
//! In a multiprocessing run each subgroup of ranks may reserve one rank
//! to hold the meteorological data. That rank sits in [`DistributedMet::serve`]
//! answering queries; every other rank's data access turns into a tagged
//! message exchange with it. A process with no such arrangement simply
//! evaluates its wrapped source directly.

use std::sync::Mutex;

use super::{DataFlags, MetError, MetSource};
use crate::pgroup::{GroupError, ProcessGroup, Tag};

/// Command codes of the met-serving protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetCommand {
    /// A client is finished with this round of queries.
    Done,
    /// Wind-vector request: time, then (lon, lat, z), reply is 3 reals.
    Uvw,
    /// Scalar request: quantity name, time, coordinates, reply is 1 real.
    Data,
}

impl MetCommand {
    pub fn as_i32(self) -> i32 {
        match self {
            MetCommand::Done => 0,
            MetCommand::Uvw => 1,
            MetCommand::Data => 2,
        }
    }

    pub fn from_i32(code: i32) -> Option<Self> {
        match code {
            0 => Some(MetCommand::Done),
            1 => Some(MetCommand::Uvw),
            2 => Some(MetCommand::Data),
            _ => None,
        }
    }
}

struct MetLink {
    group: Box<dyn ProcessGroup>,
    met_rank: usize,
}

/// A meteorological source that may live on another rank.
///
/// Wraps a local [`MetSource`] together with an optional process-group
/// link. When the link is present and names another rank as the data
/// holder, every query is forwarded there; when it names this rank, the
/// local source answers and [`serve`](DistributedMet::serve) handles the
/// peers. Unbound, the wrapper is a transparent passthrough.
pub struct DistributedMet {
    source: Box<dyn MetSource>,
    link: Mutex<Option<MetLink>>,
}

impl DistributedMet {
    pub fn new(source: Box<dyn MetSource>) -> Self {
        Self {
            source,
            link: Mutex::new(None),
        }
    }

    /// Attach this source to a process group, naming the rank that holds
    /// the data. The group handle should be dedicated to met traffic.
    pub fn bind(&mut self, group: Box<dyn ProcessGroup>, met_rank: usize) {
        if let Ok(mut link) = self.link.lock() {
            *link = Some(MetLink { group, met_rank });
        }
    }

    /// Detach from any process group; queries evaluate locally again.
    pub fn unbind(&mut self) {
        if let Ok(mut link) = self.link.lock() {
            *link = None;
        }
    }

    /// True if this rank forwards its met queries to another rank.
    pub fn is_met_client(&self) -> bool {
        match self.link.lock() {
            Ok(link) => link
                .as_ref()
                .map(|l| l.met_rank != l.group.id())
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    /// True if this rank holds the data and serves its peers.
    pub fn is_met_server(&self) -> bool {
        match self.link.lock() {
            Ok(link) => link
                .as_ref()
                .map(|l| l.met_rank == l.group.id())
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Answer peer queries until every other rank in the group has sent
    /// `Done`, then join the closing barrier.
    ///
    /// A no-op on ranks that are not the group's data holder. Evaluation
    /// faults are answered with NaN so that a client-side failure never
    /// wedges the exchange.
    pub fn serve(&self) -> Result<(), GroupError> {
        let guard = self.link.lock().map_err(|_| GroupError::Poisoned)?;
        let link = match guard.as_ref() {
            Some(l) if l.met_rank == l.group.id() => l,
            _ => return Ok(()),
        };

        let goal = link.group.size() - 1;
        let mut done = 0;
        while done < goal {
            let mut cmd = [0i32; 1];
            let src = link.group.receive_i32s(None, &mut cmd, Tag::Req)?;
            match MetCommand::from_i32(cmd[0]) {
                Some(MetCommand::Done) => done += 1,
                Some(MetCommand::Uvw) => {
                    let mut time = [0.0f64; 1];
                    link.group.receive_f64s(Some(src), &mut time, Tag::Time)?;
                    let mut pos = [0.0f64; 3];
                    link.group.receive_f64s(Some(src), &mut pos, Tag::Coords)?;
                    let (u, v, w) = self
                        .source
                        .get_uvw(time[0], pos[0], pos[1], pos[2])
                        .unwrap_or((f64::NAN, f64::NAN, f64::NAN));
                    link.group.send_f64s(src, &[u, v, w], Tag::Recv)?;
                }
                Some(MetCommand::Data) => {
                    let (quantity, _) = link.group.receive_str(Some(src), Tag::Quant)?;
                    let mut time = [0.0f64; 1];
                    link.group.receive_f64s(Some(src), &mut time, Tag::Time)?;
                    let mut pos = [0.0f64; 3];
                    link.group.receive_f64s(Some(src), &mut pos, Tag::Coords)?;
                    let val = self
                        .source
                        .get_data(&quantity, time[0], pos[0], pos[1], pos[2], DataFlags::NONE)
                        .unwrap_or(f64::NAN);
                    link.group.send_f64s(src, &[val], Tag::Recv)?;
                }
                None => {}
            }
        }
        link.group.sync();
        Ok(())
    }

    /// Tell the group's data holder this rank is finished, then join the
    /// closing barrier. A no-op without a link; the serving rank joins
    /// the same barrier from inside [`serve`](DistributedMet::serve).
    pub fn signal_done(&self) -> Result<(), GroupError> {
        let guard = self.link.lock().map_err(|_| GroupError::Poisoned)?;
        if let Some(link) = guard.as_ref() {
            if link.met_rank != link.group.id() {
                link.group
                    .send_i32s(link.met_rank, &[MetCommand::Done.as_i32()], Tag::Req)?;
                link.group.sync();
            }
        }
        Ok(())
    }

    fn forward_uvw(
        &self,
        link: &MetLink,
        t: f64,
        lon: f64,
        lat: f64,
        z: f64,
    ) -> Result<(f64, f64, f64), MetError> {
        let exchange = || -> Result<[f64; 3], GroupError> {
            link.group
                .send_i32s(link.met_rank, &[MetCommand::Uvw.as_i32()], Tag::Req)?;
            link.group.send_f64s(link.met_rank, &[t], Tag::Time)?;
            link.group
                .send_f64s(link.met_rank, &[lon, lat, z], Tag::Coords)?;
            let mut reply = [0.0f64; 3];
            link.group
                .receive_f64s(Some(link.met_rank), &mut reply, Tag::Recv)?;
            Ok(reply)
        };
        let reply = exchange().map_err(|_| MetError::ServerExchange)?;
        // served vertical winds arrive in wire units
        Ok((
            reply[0],
            reply[1],
            reply[2] * self.source.vertical_wind_factor(),
        ))
    }

    fn forward_data(
        &self,
        link: &MetLink,
        quantity: &str,
        t: f64,
        lon: f64,
        lat: f64,
        z: f64,
        flags: DataFlags,
    ) -> Result<f64, MetError> {
        let exchange = || -> Result<f64, GroupError> {
            link.group
                .send_i32s(link.met_rank, &[MetCommand::Data.as_i32()], Tag::Req)?;
            link.group.send_str(link.met_rank, quantity, Tag::Quant)?;
            link.group.send_f64s(link.met_rank, &[t], Tag::Time)?;
            link.group
                .send_f64s(link.met_rank, &[lon, lat, z], Tag::Coords)?;
            let mut reply = [0.0f64; 1];
            link.group
                .receive_f64s(Some(link.met_rank), &mut reply, Tag::Recv)?;
            Ok(reply[0])
        };
        let mut val = exchange().map_err(|_| MetError::ServerExchange)?;
        // the server evaluates in native units; unit conversion is local
        if quantity == "p" && flags.contains(DataFlags::MKS) {
            val *= 0.10;
        }
        // the server answers faults with NaN; translate per the flags
        if val.is_nan() && !flags.contains(DataFlags::NAN_BAD) {
            if flags.contains(DataFlags::INF_BAD) {
                return Ok(f64::INFINITY);
            }
            return Err(MetError::BadData {
                quantity: quantity.to_string(),
            });
        }
        Ok(val)
    }
}

impl MetSource for DistributedMet {
    fn name(&self) -> &'static str {
        self.source.name()
    }

    fn get_uvw(&self, t: f64, lon: f64, lat: f64, z: f64) -> Result<(f64, f64, f64), MetError> {
        let guard = self.link.lock().map_err(|_| MetError::ServerExchange)?;
        match guard.as_ref() {
            Some(link) if link.met_rank != link.group.id() => {
                self.forward_uvw(link, t, lon, lat, z)
            }
            _ => self.source.get_uvw(t, lon, lat, z),
        }
    }

    fn get_data(
        &self,
        quantity: &str,
        t: f64,
        lon: f64,
        lat: f64,
        z: f64,
        flags: DataFlags,
    ) -> Result<f64, MetError> {
        let guard = self.link.lock().map_err(|_| MetError::ServerExchange)?;
        match guard.as_ref() {
            Some(link) if link.met_rank != link.group.id() => {
                self.forward_data(link, quantity, t, lon, lat, z, flags)
            }
            _ => self.source.get_data(quantity, t, lon, lat, z, flags),
        }
    }

    fn get_uvw_slice(
        &self,
        t: f64,
        lons: &[f64],
        lats: &[f64],
        zs: &[f64],
        us: &mut [f64],
        vs: &mut [f64],
        ws: &mut [f64],
    ) {
        for i in 0..lons.len() {
            match self.get_uvw(t, lons[i], lats[i], zs[i]) {
                Ok((u, v, w)) => {
                    us[i] = u;
                    vs[i] = v;
                    ws[i] = w;
                }
                Err(_) => {
                    us[i] = f64::NAN;
                    vs[i] = f64::NAN;
                    ws[i] = f64::NAN;
                }
            }
        }
    }

    fn vertical_wind_factor(&self) -> f64 {
        self.source.vertical_wind_factor()
    }

    fn debug(&self) -> i32 {
        self.source.debug()
    }

    fn set_debug(&mut self, level: i32) {
        self.source.set_debug(level);
    }
}
