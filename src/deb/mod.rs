// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Serialization of `.deb` package files.

A `.deb` is an `ar` archive with three members in fixed order:
`debian-binary`, `control.tar.gz`, and `data.tar.gz`. The [tar] module
serializes staged trees into the gzip-compressed tar members and [ar]
writes the outer container.
*/

pub mod ar;
pub mod tar;
