//! Picking which HAT to talk to.

use std::io::{BufRead, Write};

use log::{debug, info};

use crate::types::{HatError, HatId, HatInfo, HatLister};

/// Choose the address of a board matching `filter`.
///
/// A `preferred` address is checked against the device list. Otherwise a
/// single board is used directly, and with several boards the user is asked
/// for an address on `input`.
pub fn select_hat_device<L, R, W>(
    lister: &L,
    filter: HatId,
    preferred: Option<u8>,
    input: &mut R,
    output: &mut W,
) -> Result<u8, HatError>
where
    L: HatLister + ?Sized,
    R: BufRead,
    W: Write,
{
    let boards = lister.hat_list(filter)?;
    debug!("hat_list({:?}) found {} boards", filter, boards.len());

    if boards.is_empty() {
        return Err(HatError::NoDevices);
    }

    let address = match preferred {
        Some(address) => find(&boards, address)?,
        None if boards.len() == 1 => boards[0].address,
        None => prompt_for_address(&boards, input, output)?,
    };

    info!("Selected HAT at address {}", address);
    Ok(address)
}

fn find(boards: &[HatInfo], address: u8) -> Result<u8, HatError> {
    boards
        .iter()
        .find(|info| info.address == address)
        .map(|info| info.address)
        .ok_or(HatError::InvalidAddress(address))
}

fn prompt_for_address<R: BufRead, W: Write>(
    boards: &[HatInfo],
    input: &mut R,
    output: &mut W,
) -> Result<u8, HatError> {
    for info in boards {
        writeln!(output, "    {}", info)?;
    }
    write!(output, "\nSelect the address of the HAT device to use: ")?;
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    let address: u8 = line
        .trim()
        .parse()
        .map_err(|_| HatError::BadParameter(format!("'{}' is not an address", line.trim())))?;

    find(boards, address)
}
